//! Write buffer staging samples until the next flush

use crate::schema::Sample;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// In-memory staging area keyed by shard path.
///
/// The map is only reachable through `append`, `drain_all` and the cloning
/// accessors, so the swap in `drain_all` is the single point where buffered
/// samples change hands.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    shards: Mutex<HashMap<PathBuf, Vec<Sample>>>,
}

impl WriteBuffer {
    /// Create a new empty write buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to the shard it belongs to. Never touches disk.
    pub fn append(&self, shard: PathBuf, sample: Sample) {
        self.shards.lock().entry(shard).or_default().push(sample);
    }

    /// Swap the buffer for an empty one and return everything it held.
    pub fn drain_all(&self) -> BufferSnapshot {
        let shards = std::mem::take(&mut *self.shards.lock());
        BufferSnapshot { shards }
    }

    /// Copy of the samples still buffered for one shard, in arrival order
    pub fn pending_for(&self, shard: &Path) -> Vec<Sample> {
        self.shards.lock().get(shard).cloned().unwrap_or_default()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.shards.lock().is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        let shards = self.shards.lock();
        BufferStats {
            shard_count: shards.len(),
            sample_count: shards.values().map(Vec::len).sum(),
        }
    }
}

/// Contents of the buffer at the moment of a drain
#[derive(Debug, Default)]
pub struct BufferSnapshot {
    shards: HashMap<PathBuf, Vec<Sample>>,
}

impl BufferSnapshot {
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn sample_count(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }

    pub fn get(&self, shard: &Path) -> Option<&[Sample]> {
        self.shards.get(shard).map(Vec::as_slice)
    }
}

impl IntoIterator for BufferSnapshot {
    type Item = (PathBuf, Vec<Sample>);
    type IntoIter = std::collections::hash_map::IntoIter<PathBuf, Vec<Sample>>;

    fn into_iter(self) -> Self::IntoIter {
        self.shards.into_iter()
    }
}

/// Buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub shard_count: usize,
    pub sample_count: usize,
}

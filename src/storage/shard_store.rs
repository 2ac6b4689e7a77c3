//! Whole-day JSON shard files with lenient reads and atomic replace.

use crate::schema::Sample;
use crate::storage::ShardKey;
use crate::{Error, Result};

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of loading a shard without failing the caller.
///
/// Anything other than `Loaded` means the shard is treated as empty.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardLoad {
    /// Shard parsed; may legitimately be an empty array
    Loaded(Vec<Sample>),
    /// No file at the shard path
    Missing,
    /// File exists but could not be read
    Unreadable(String),
    /// File read but is not a JSON array of samples
    Corrupt(String),
}

impl ShardLoad {
    pub fn into_samples(self) -> Vec<Sample> {
        match self {
            ShardLoad::Loaded(samples) => samples,
            _ => Vec::new(),
        }
    }

    fn log(&self, path: &Path) {
        match self {
            ShardLoad::Loaded(samples) => {
                debug!(shard = %path.display(), samples = samples.len(), "Shard loaded")
            }
            ShardLoad::Missing => {
                info!(shard = %path.display(), "Shard not found, treating as empty")
            }
            ShardLoad::Unreadable(reason) => {
                warn!(shard = %path.display(), error = %reason, "Shard unreadable, treating as empty")
            }
            ShardLoad::Corrupt(reason) => {
                warn!(shard = %path.display(), error = %reason, "Shard JSON is corrupted, treating as empty")
            }
        }
    }
}

/// Result of a successful merge-and-persist
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub path: PathBuf,
    /// Samples that were already on disk and readable
    pub previous: usize,
    /// Samples in the file after the write
    pub written: usize,
}

/// Filesystem-backed shard store rooted at one directory.
///
/// All methods block; async callers run them on the blocking pool.
#[derive(Debug, Clone)]
pub struct ShardStore {
    root: PathBuf,
}

impl ShardStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ShardKey) -> PathBuf {
        key.path_in(&self.root)
    }

    /// Load a shard by key; absence and corruption yield empty data.
    pub fn read_shard(&self, key: &ShardKey) -> ShardLoad {
        self.load_leniently(&self.path_for(key))
    }

    /// Shared lenient loader for the read path and the pre-merge read.
    pub fn load_leniently(&self, path: &Path) -> ShardLoad {
        let load = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Sample>>(&bytes) {
                Ok(samples) => ShardLoad::Loaded(samples),
                Err(e) => ShardLoad::Corrupt(e.to_string()),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => ShardLoad::Missing,
            Err(e) => ShardLoad::Unreadable(e.to_string()),
        };
        load.log(path);
        load
    }

    /// Merge `samples` into the shard at `path` and atomically replace it.
    ///
    /// Unreadable prior content is dropped in favour of the new samples. The
    /// combined sequence is stably sorted by timestamp, written to a sibling
    /// temporary file and renamed over the target.
    pub fn merge_and_persist(&self, path: &Path, samples: Vec<Sample>) -> Result<PersistOutcome> {
        let mut combined = self.load_leniently(path).into_samples();
        let previous = combined.len();
        combined.extend(samples);
        combined.sort_by_key(|s| s.timestamp);

        let parent = path
            .parent()
            .ok_or_else(|| Error::Internal(format!("shard path {} has no parent", path.display())))?;
        fs::create_dir_all(parent)?;

        let payload = serde_json::to_vec(&combined)?;
        let tmp = temp_path(path);
        if let Err(e) = write_synced(&tmp, &payload) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(
            shard = %path.display(),
            previous,
            written = combined.len(),
            bytes = payload.len(),
            "Shard persisted"
        );
        Ok(PersistOutcome {
            path: path.to_path_buf(),
            previous,
            written: combined.len(),
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_at(secs: u32, value: f64) -> Sample {
        let ts: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, secs).unwrap();
        Sample::new(BTreeMap::from([("v".to_string(), value)]), ts)
    }

    fn key() -> ShardKey {
        ShardKey::from_parts("cpu", 2024, 3, 1).unwrap()
    }

    #[test]
    fn test_missing_shard_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let load = store.read_shard(&key());
        assert_eq!(load, ShardLoad::Missing);
        assert!(load.into_samples().is_empty());
    }

    #[test]
    fn test_corrupt_shard_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let path = store.path_for(&key());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"[{\"v\": 1, \"timestamp\": ").unwrap();

        assert!(matches!(store.read_shard(&key()), ShardLoad::Corrupt(_)));
    }

    #[test]
    fn test_empty_array_is_loaded_not_missing() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let path = store.path_for(&key());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"[]").unwrap();

        assert_eq!(store.read_shard(&key()), ShardLoad::Loaded(Vec::new()));
    }

    #[test]
    fn test_merge_sorts_and_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let path = store.path_for(&key());

        store
            .merge_and_persist(&path, vec![sample_at(30, 3.0), sample_at(10, 1.0)])
            .unwrap();
        let outcome = store
            .merge_and_persist(&path, vec![sample_at(20, 2.0)])
            .unwrap();
        assert_eq!(outcome.previous, 2);
        assert_eq!(outcome.written, 3);

        let values: Vec<f64> = store
            .read_shard(&key())
            .into_samples()
            .iter()
            .map(|s| s.get("v").unwrap())
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(!temp_path(&path).exists(), "temporary file must be renamed away");
    }

    #[test]
    fn test_merge_same_sample_twice_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let path = store.path_for(&key());

        store.merge_and_persist(&path, vec![sample_at(5, 1.0)]).unwrap();
        store.merge_and_persist(&path, vec![sample_at(5, 1.0)]).unwrap();

        let samples = store.read_shard(&key()).into_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], samples[1]);
    }

    #[test]
    fn test_merge_over_corrupt_shard_keeps_new_samples() {
        let dir = TempDir::new().unwrap();
        let store = ShardStore::open(dir.path());
        let path = store.path_for(&key());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let outcome = store.merge_and_persist(&path, vec![sample_at(1, 9.0)]).unwrap();
        assert_eq!(outcome.previous, 0);
        assert_eq!(store.read_shard(&key()).into_samples().len(), 1);
    }

    #[test]
    fn test_merge_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        // A regular file where the thing directory should be.
        fs::write(dir.path().join("cpu"), b"").unwrap();
        let store = ShardStore::open(dir.path());

        let err = store
            .merge_and_persist(&store.path_for(&key()), vec![sample_at(1, 1.0)])
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let path = Path::new("/s/cpu/2024/03/01.json");
        assert_eq!(temp_path(path), PathBuf::from("/s/cpu/2024/03/01.json.tmp"));
    }
}

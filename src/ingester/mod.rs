//! Ingester module for Lightlog
//!
//! The ingester is responsible for:
//! - Stamping and buffering incoming samples in memory
//! - Serving reads as the union of disk and still-buffered samples
//! - Periodically draining the buffer into daily shard files
//! - Running the pre-start and post-flush hooks

mod buffer;
pub(crate) mod telemetry;

pub use buffer::{BufferSnapshot, BufferStats, WriteBuffer};

use crate::clock::{Clock, SystemClock};
use crate::hooks::{run_hook, CommandRunner, HookContext, HookOutcome, ShellCommandRunner};
use crate::schema::Sample;
use crate::storage::{validate_thing, ShardKey, ShardStore};
use crate::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the ingester
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Root directory of the shard store
    pub store_root: PathBuf,
    /// Time between flush cycles
    pub flush_interval: Duration,
    /// Hard kill timeout for hook commands
    pub hook_timeout: Duration,
    /// Command template run once before scheduling starts
    pub before_start_cmd: Option<String>,
    /// Command template run after each non-empty flush
    pub after_flush_cmd: Option<String>,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(".lightlog"),
            flush_interval: Duration::from_secs(300), // 5 minutes
            hook_timeout: Duration::from_secs(60),
            before_start_cmd: None,
            after_flush_cmd: None,
        }
    }
}

/// Summary of one flush cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub shards_written: usize,
    pub samples_written: usize,
    /// Shards whose write or rename failed; their samples are gone
    pub shards_failed: Vec<PathBuf>,
    pub samples_dropped: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.shards_written == 0 && self.shards_failed.is_empty()
    }
}

/// Ingester node owning the write buffer and the shard store
pub struct Ingester {
    config: IngesterConfig,
    buffer: WriteBuffer,
    store: ShardStore,
    hooks: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    /// Serializes flush cycles so one shard is never merged concurrently
    flush_lock: Mutex<()>,
    /// Cancellation token for graceful shutdown
    shutdown: CancellationToken,
}

impl Ingester {
    /// Create an ingester using the system clock and a `bash` hook runner
    pub fn new(config: IngesterConfig) -> Self {
        let store = ShardStore::open(config.store_root.clone());
        Self {
            config,
            buffer: WriteBuffer::new(),
            store,
            hooks: Arc::new(ShellCommandRunner::default()),
            clock: Arc::new(SystemClock::new()),
            flush_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_command_runner(mut self, hooks: Arc<dyn CommandRunner>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &ShardStore {
        &self.store
    }

    /// Get a cancellation token that can be used to trigger graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stamp a sample with the current time and stage it in the buffer.
    ///
    /// Rejects the whole write, without touching the buffer, if any field is
    /// not a finite float. Returns the stored sample.
    pub fn write<I, K, V>(&self, thing: &str, pairs: I) -> Result<Sample>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        if let Err(e) = validate_thing(thing) {
            telemetry::record_write_rejection("thing");
            return Err(e);
        }
        let timestamp = self.clock.now();
        let sample = match Sample::from_pairs(pairs, timestamp) {
            Ok(sample) => sample,
            Err(e) => {
                telemetry::record_write_rejection("field");
                return Err(e);
            }
        };

        let shard = self
            .store
            .path_for(&ShardKey::for_timestamp(thing, &sample.timestamp));
        self.buffer.append(shard, sample.clone());
        telemetry::record_write(sample.fields.len() as u64);
        debug!(thing, fields = sample.fields.len(), "Sample buffered");

        Ok(sample)
    }

    /// All samples of one shard: on-disk content followed by buffered ones.
    ///
    /// A read racing an in-flight flush may transiently miss the samples
    /// being persisted by that flush.
    pub async fn read(&self, key: &ShardKey) -> Result<Vec<Sample>> {
        validate_thing(&key.thing)?;
        let store = self.store.clone();
        let disk_key = key.clone();
        let mut samples =
            tokio::task::spawn_blocking(move || store.read_shard(&disk_key).into_samples())
                .await?;
        samples.extend(self.buffer.pending_for(&self.store.path_for(key)));
        Ok(samples)
    }

    /// Run one flush cycle: drain, persist every shard, then run the
    /// post-flush hook. An empty buffer does no disk I/O and runs no hook.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _cycle = self.flush_lock.lock().await;

        let snapshot = self.buffer.drain_all();
        if snapshot.is_empty() {
            debug!("Write buffer empty, skipping flush");
            return Ok(FlushReport::default());
        }

        let shard_count = snapshot.shard_count();
        let sample_count = snapshot.sample_count();
        info!(shards = shard_count, samples = sample_count, "Flushing write buffer");

        let start = Instant::now();
        let store = self.store.clone();
        let report = tokio::task::spawn_blocking(move || persist_snapshot(&store, snapshot)).await;
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                error!(samples = sample_count, error = %e, "Flush task aborted; samples dropped");
                return Err(Error::from(e));
            }
        };

        telemetry::record_flush(
            start.elapsed().as_secs_f64(),
            sample_count as u64,
            report.shards_written as u64,
            report.shards_failed.len() as u64,
        );
        info!(
            shards_written = report.shards_written,
            shards_failed = report.shards_failed.len(),
            samples_written = report.samples_written,
            samples_dropped = report.samples_dropped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Flush complete"
        );

        let context = HookContext::at(self.store.root(), self.clock.now());
        run_hook(
            self.hooks.as_ref(),
            "after_flush",
            self.config.after_flush_cmd.as_deref(),
            &context,
            self.config.hook_timeout,
        )
        .await;

        Ok(report)
    }

    /// Run the pre-start hook once. Failures are logged, never returned.
    pub async fn run_startup_hook(&self) -> Option<HookOutcome> {
        info!("executing initial fetch data command");
        let context = HookContext::at(self.store.root(), self.clock.now());
        run_hook(
            self.hooks.as_ref(),
            "before_start",
            self.config.before_start_cmd.as_deref(),
            &context,
            self.config.hook_timeout,
        )
        .await
    }

    /// Startup hook first, then the flush timer until shutdown.
    pub async fn run_scheduler(&self) {
        self.run_startup_hook().await;
        self.run_flush_timer().await;
    }

    /// Background flush timer. Returns when the shutdown token is cancelled,
    /// after flushing any remaining data.
    pub async fn run_flush_timer(&self) {
        let period = self.config.flush_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every_secs = period.as_secs(), "scheduling flush");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.flush().await {
                        error!("Flush timer failed: {}", e);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Flush timer shutting down, flushing remaining data");
                    if let Err(e) = self.flush().await {
                        error!("Final flush failed during shutdown: {}", e);
                    }
                    break;
                }
            }
        }
    }

    /// Get current buffer stats
    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }
}

/// Persist each drained shard independently; one failure never stops the rest.
fn persist_snapshot(store: &ShardStore, snapshot: BufferSnapshot) -> FlushReport {
    let mut report = FlushReport::default();
    for (shard, samples) in snapshot {
        let count = samples.len();
        match store.merge_and_persist(&shard, samples) {
            Ok(outcome) => {
                debug!(shard = %outcome.path.display(), written = outcome.written, "Shard flushed");
                report.shards_written += 1;
                report.samples_written += count;
            }
            Err(e) => {
                error!(
                    shard = %shard.display(),
                    dropped_samples = count,
                    error = %e,
                    "Shard flush failed; buffered samples dropped"
                );
                report.shards_failed.push(shard);
                report.samples_dropped += count;
            }
        }
    }
    report
}

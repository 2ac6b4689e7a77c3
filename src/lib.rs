//! # Lightlog
//!
//! A small embedded time-series log store served over HTTP.
//!
//! Clients post flat numeric samples for a named series (a "thing"). Samples
//! are stamped with the current UTC time and staged in memory; a periodic
//! flush merges them into one JSON shard file per thing and UTC day, using
//! write-temp-then-rename so readers never observe a partial file. Reads
//! union what is on disk with whatever is still buffered for the same shard.
//!
//! ## Architecture
//!
//! - **Schema**: [`schema::Sample`], an open set of named `f64` fields plus a
//!   server-assigned timestamp
//! - **Storage**: shard path resolution and the durable, lenient
//!   [`storage::ShardStore`]
//! - **Ingester**: the [`ingester::WriteBuffer`] and the flush scheduler that
//!   drains it
//! - **Hooks**: external pre-start and post-flush shell commands
//! - **API**: axum handlers for `/write` and `/read`

pub mod api;
pub mod clock;
pub mod config;
pub mod hooks;
pub mod ingester;
pub mod schema;
pub mod storage;
pub mod telemetry;

mod error;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::hooks::{CommandRunner, HookContext, HookOutcome, HookStatus, ShellCommandRunner};
    pub use crate::ingester::{FlushReport, Ingester, IngesterConfig, WriteBuffer};
    pub use crate::schema::Sample;
    pub use crate::storage::{ShardKey, ShardLoad, ShardStore};
    pub use crate::{Config, Error, Result};
}

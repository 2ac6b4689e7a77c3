//! Durable shard storage
//!
//! One shard holds every sample of one thing for one UTC calendar day, stored
//! as a JSON array at `<root>/<thing>/<YYYY>/<MM>/<DD>.json`. Shard identity
//! depends only on the sample's own timestamp, never on when it was flushed.

mod shard_store;

pub use shard_store::{PersistOutcome, ShardLoad, ShardStore};

use crate::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::path::{Path, PathBuf};

/// Resolve the on-disk path of a shard. Pure: no validation, no I/O.
pub fn shard_path(root: &Path, thing: &str, year: i32, month: u32, day: u32) -> PathBuf {
    root.join(thing)
        .join(format!("{:04}", year))
        .join(format!("{:02}", month))
        .join(format!("{:02}.json", day))
}

/// Reject thing names that are empty or could address outside the store root.
pub fn validate_thing(thing: &str) -> Result<()> {
    if thing.is_empty() || thing == "." || thing == ".." {
        return Err(Error::InvalidThing(format!("'{}'", thing)));
    }
    if thing.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidThing(format!(
            "'{}' contains a path separator",
            thing.escape_default()
        )));
    }
    Ok(())
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Identity of one shard: a thing and a UTC day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey {
    pub thing: String,
    pub date: NaiveDate,
}

impl ShardKey {
    pub fn new(thing: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            thing: thing.into(),
            date,
        }
    }

    /// Shard a sample stamped at `ts` belongs to
    pub fn for_timestamp(thing: impl Into<String>, ts: &DateTime<Utc>) -> Self {
        Self::new(thing, ts.date_naive())
    }

    /// Build a key from path components, rejecting impossible dates and
    /// years that do not fit the four-digit directory layout.
    pub fn from_parts(thing: impl Into<String>, year: i32, month: u32, day: u32) -> Result<Self> {
        if !(1..=9999).contains(&year) {
            return Err(Error::InvalidDate(format!("year {} out of range", year)));
        }
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            Error::InvalidDate(format!("{:04}-{:02}-{:02}", year, month, day))
        })?;
        Ok(Self::new(thing, date))
    }

    /// `<thing>/<YYYY>/<MM>/<DD>.json`, relative to the store root
    pub fn relative_path(&self) -> PathBuf {
        shard_path(
            Path::new(""),
            &self.thing,
            self.date.year(),
            self.date.month(),
            self.date.day(),
        )
    }

    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }
}

//! Process configuration
//!
//! The binary fills a [`Config`] from command-line flags (with environment
//! fallbacks); everything below the binary consumes this struct.

use crate::ingester::IngesterConfig;
use crate::storage::expand_home;
use crate::{Error, Result};

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE: &str = "~/.lightlog";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4242;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 60;

/// Configuration for the Lightlog process
#[derive(Debug, Clone)]
pub struct Config {
    /// Shard store root; a leading `~` is expanded
    pub store_root: PathBuf,
    /// Command run once before the flush scheduler starts
    pub before_start_cmd: Option<String>,
    /// Command run after each non-empty flush
    pub after_flush_cmd: Option<String>,
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Flush cycle interval
    pub flush_interval: Duration,
    /// Kill timeout for hook commands
    pub hook_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(DEFAULT_STORE),
            before_start_cmd: None,
            after_flush_cmd: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            hook_timeout: Duration::from_secs(DEFAULT_HOOK_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Check values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(Error::Config(
                "flush interval must be at least one second".to_string(),
            ));
        }
        if self.hook_timeout.is_zero() {
            return Err(Error::Config(
                "hook timeout must be at least one second".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("listen host cannot be empty".to_string()));
        }
        if self.store_root.as_os_str().is_empty() {
            return Err(Error::Config("store path cannot be empty".to_string()));
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ingester_config(&self) -> IngesterConfig {
        IngesterConfig {
            store_root: expand_home(&self.store_root),
            flush_interval: self.flush_interval,
            hook_timeout: self.hook_timeout,
            before_start_cmd: non_empty(&self.before_start_cmd),
            after_flush_cmd: non_empty(&self.after_flush_cmd),
        }
    }
}

fn non_empty(cmd: &Option<String>) -> Option<String> {
    cmd.as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "localhost:4242");
        assert_eq!(config.flush_interval, Duration::from_secs(300));
        assert_eq!(config.hook_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = Config {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            hook_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingester_config_drops_blank_commands() {
        let config = Config {
            store_root: PathBuf::from("/var/lib/lightlog"),
            before_start_cmd: Some("   ".to_string()),
            after_flush_cmd: Some(" sync.sh {fetch_shards} ".to_string()),
            ..Default::default()
        };
        let ingester = config.ingester_config();
        assert_eq!(ingester.store_root, PathBuf::from("/var/lib/lightlog"));
        assert_eq!(ingester.before_start_cmd, None);
        assert_eq!(ingester.after_flush_cmd.as_deref(), Some("sync.sh {fetch_shards}"));
    }
}

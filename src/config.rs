//! Service configuration.

use crate::constants::{
    DEFAULT_MAX_NOTIFICATIONS_PER_PAGE, DEFAULT_STREAM_CHANNEL_CAPACITY,
    DEFAULT_STREAM_IDLE_TIMEOUT, DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_INTERVAL,
};
use crate::error::{MurmurError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default data directory name.
const DATA_DIR: &str = "murmur_data";

/// Runtime settings for the core components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Interval between ban expiry sweeps.
    pub sweep_interval: Duration,
    /// Expired bans processed per sweep batch.
    pub sweep_batch_size: usize,
    /// Idle period after which a notification stream is closed.
    pub stream_idle_timeout: Duration,
    /// Buffered events per live stream session.
    pub stream_channel_capacity: usize,
    /// Maximum notifications returned by one pull.
    pub max_notifications_per_page: usize,
    /// Directory holding the RocksDB database.
    pub data_dir: PathBuf,
    /// Skip persistence entirely.
    pub in_memory: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            stream_channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
            max_notifications_per_page: DEFAULT_MAX_NOTIFICATIONS_PER_PAGE,
            data_dir: PathBuf::from(DATA_DIR),
            in_memory: false,
        }
    }
}

impl ServiceConfig {
    /// Configuration for tests: in-memory, small batches.
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            sweep_batch_size: 8,
            ..Self::default()
        }
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(MurmurError::config("sweep_interval must be positive"));
        }
        if self.sweep_batch_size == 0 {
            return Err(MurmurError::config("sweep_batch_size must be positive"));
        }
        if self.stream_idle_timeout.is_zero() {
            return Err(MurmurError::config("stream_idle_timeout must be positive"));
        }
        if self.stream_channel_capacity == 0 {
            return Err(MurmurError::config(
                "stream_channel_capacity must be positive",
            ));
        }
        if self.max_notifications_per_page == 0 {
            return Err(MurmurError::config(
                "max_notifications_per_page must be positive",
            ));
        }
        if !self.in_memory && self.data_dir.as_os_str().is_empty() {
            return Err(MurmurError::config("data_dir is required unless in_memory"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
        assert!(ServiceConfig::in_memory().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = ServiceConfig {
            sweep_batch_size: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(MurmurError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"in_memory": true, "sweep_batch_size": 5}"#).unwrap();
        assert!(config.in_memory);
        assert_eq!(config.sweep_batch_size, 5);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }
}

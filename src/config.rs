//! Fanout configuration

use crate::core::{FanoutError, Result};
use serde::{Deserialize, Serialize};

/// Default number of worker threads
pub const DEFAULT_WORKERS: usize = 1;
/// Default queue capacity
pub const DEFAULT_BUFFER: usize = 1024;

/// Worker count and queue capacity of a fanout
///
/// Both values are fixed for the lifetime of the fanout built from it. Zero
/// is rejected by [`validate`](Self::validate), which every constructor calls.
///
/// ```rust
/// use fanout::FanoutConfig;
///
/// let config = FanoutConfig::new().with_workers(4).with_buffer(256);
/// assert!(config.validate().is_ok());
///
/// let config: FanoutConfig = serde_json::from_str(r#"{"workers": 2}"#).unwrap();
/// assert_eq!(config.buffer, 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum number of queued tasks
    pub buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl FanoutConfig {
    /// Configuration with the defaults: one worker, 1024 slots
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FanoutError::invalid_config(
                "workers",
                "must be greater than 0",
            ));
        }
        if self.buffer == 0 {
            return Err(FanoutError::invalid_config(
                "buffer",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FanoutConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.buffer, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = FanoutConfig::new().with_workers(0).validate().unwrap_err();
        assert!(matches!(err, FanoutError::InvalidConfig { ref parameter, .. } if parameter == "workers"));

        let err = FanoutConfig::new().with_buffer(0).validate().unwrap_err();
        assert!(matches!(err, FanoutError::InvalidConfig { ref parameter, .. } if parameter == "buffer"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: FanoutConfig = serde_json::from_str(r#"{"buffer": 8}"#).unwrap();
        assert_eq!(config, FanoutConfig::new().with_buffer(8));

        // Negative counts are not representable
        assert!(serde_json::from_str::<FanoutConfig>(r#"{"workers": -1}"#).is_err());
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Store configuration.
///
/// Missing fields take their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Turns on the trace sink for the whole process when the store is
    /// created, so every store traces from then on. `false` leaves the sink
    /// as it is; only [`trace::set_enabled`](crate::trace::set_enabled)
    /// turns it off.
    pub log: bool,
    /// Delay before a throttled batch closes, in milliseconds.
    pub throttle_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            log: false,
            throttle_ms: 1000,
        }
    }
}

impl StoreOptions {
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Options(e.to_string()))
    }

    /// See [`StoreOptions::log`]: the flag is process-wide.
    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::default();
        assert!(!options.log);
        assert_eq!(options.throttle_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json() {
        let options = StoreOptions::from_json_str(r#"{"log": true}"#).unwrap();
        assert!(options.log);
        assert_eq!(options.throttle_ms, 1000);
        assert_eq!(StoreOptions::from_json_str("{}").unwrap(), StoreOptions::default());
    }

    #[test]
    fn test_bad_json() {
        let error = StoreOptions::from_json_str(r#"{"throttle_ms": "soon"}"#).unwrap_err();
        assert!(matches!(error, StoreError::Options(_)));
    }
}

//! Stream Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by every stream a client opens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest single record the decoder will buffer, in bytes
    pub max_record_bytes: usize,

    /// Idle window in milliseconds (0 = no idle detection)
    ///
    /// The server sends a keep-alive at least every 20 seconds, so a silent
    /// connection for longer than this is treated as stalled.
    pub idle_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: 1024 * 1024,
            idle_timeout_ms: 30_000,
        }
    }
}

impl StreamConfig {
    /// The idle window, if idle detection is enabled
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Disable idle detection
    #[must_use]
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.max_record_bytes, 1024 * 1024);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_idle_timeout_disabled() {
        let config = StreamConfig::default().without_idle_timeout();
        assert_eq!(config.idle_timeout(), None);
    }
}

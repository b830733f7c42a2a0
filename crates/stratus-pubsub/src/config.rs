//! Client configuration for admin and consumer wrappers.
//!
//! Loaded from `STRATUS_*` environment variables with hardcoded fallbacks:
//!
//! ```bash
//! STRATUS_CONSUMER_POLL_RETRY_TIMES=3
//! STRATUS_CONSUMER_POLL_RETRY_BACKOFF_MS=0
//! STRATUS_CONSUMER_RECEIVE_BUFFER_BYTES=1048576
//! STRATUS_ADMIN_GET_TOPIC_CONFIG_MAX_RETRY_SECS=300
//! STRATUS_ADMIN_RECEIVE_BUFFER_BYTES=1048576
//! ```

use std::time::Duration;

/// Metadata queries against a cold broker benefit from a large socket
/// buffer; values below this floor are clamped up.
pub const MIN_RECEIVE_BUFFER_BYTES: usize = 1024 * 1024;

const DEFAULT_POLL_RETRY_TIMES: u32 = 3;
const DEFAULT_POLL_RETRY_BACKOFF_MS: u64 = 0;
const DEFAULT_GET_TOPIC_CONFIG_MAX_RETRY_SECS: u64 = 300;

/// Raw consumer wrapper configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Attempts per poll before the transient error is rethrown
    pub poll_retry_times: u32,

    /// Sleep between poll attempts
    pub poll_retry_backoff_ms: u64,

    /// Socket receive buffer size
    pub receive_buffer_bytes: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_retry_times: DEFAULT_POLL_RETRY_TIMES,
            poll_retry_backoff_ms: DEFAULT_POLL_RETRY_BACKOFF_MS,
            receive_buffer_bytes: MIN_RECEIVE_BUFFER_BYTES,
        }
    }
}

impl ConsumerConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            poll_retry_times: env_parse(
                "STRATUS_CONSUMER_POLL_RETRY_TIMES",
                DEFAULT_POLL_RETRY_TIMES,
            ),
            poll_retry_backoff_ms: env_parse(
                "STRATUS_CONSUMER_POLL_RETRY_BACKOFF_MS",
                DEFAULT_POLL_RETRY_BACKOFF_MS,
            ),
            receive_buffer_bytes: env_parse(
                "STRATUS_CONSUMER_RECEIVE_BUFFER_BYTES",
                MIN_RECEIVE_BUFFER_BYTES,
            )
            .max(MIN_RECEIVE_BUFFER_BYTES),
        }
    }

    pub fn poll_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_retry_backoff_ms)
    }
}

/// Admin client configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Window over which `get_topic_config_with_retry` keeps retrying
    /// transient faults
    pub get_topic_config_max_retry_secs: u64,

    /// Socket receive buffer size
    pub receive_buffer_bytes: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            get_topic_config_max_retry_secs: DEFAULT_GET_TOPIC_CONFIG_MAX_RETRY_SECS,
            receive_buffer_bytes: MIN_RECEIVE_BUFFER_BYTES,
        }
    }
}

impl AdminConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            get_topic_config_max_retry_secs: env_parse(
                "STRATUS_ADMIN_GET_TOPIC_CONFIG_MAX_RETRY_SECS",
                DEFAULT_GET_TOPIC_CONFIG_MAX_RETRY_SECS,
            ),
            receive_buffer_bytes: env_parse(
                "STRATUS_ADMIN_RECEIVE_BUFFER_BYTES",
                MIN_RECEIVE_BUFFER_BYTES,
            )
            .max(MIN_RECEIVE_BUFFER_BYTES),
        }
    }

    pub fn get_topic_config_max_retry(&self) -> Duration {
        Duration::from_secs(self.get_topic_config_max_retry_secs)
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

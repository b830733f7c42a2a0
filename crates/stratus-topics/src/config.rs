//! Topic manager configuration.
//!
//! Loaded from `STRATUS_TOPIC_*` environment variables with hardcoded
//! fallbacks:
//!
//! ```bash
//! STRATUS_TOPIC_OPERATION_TIMEOUT_MS=30000
//! STRATUS_TOPIC_DELETION_STATUS_POLL_INTERVAL_MS=2000
//! STRATUS_TOPIC_MIN_LOG_COMPACTION_LAG_MS=86400000
//! STRATUS_TOPIC_ALLOW_CONCURRENT_DELETION=false
//! STRATUS_TOPIC_CONFIG_CACHE_TTL_MS=300000
//! STRATUS_TOPIC_CONFIG_CACHE_MAX_CAPACITY=1024
//! ```

use std::time::Duration;

const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
const FAST_OPERATION_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_DELETION_STATUS_POLL_INTERVAL_MS: u64 = 2_000;
/// No compaction of records produced within the last day, so reprocessing
/// jobs that replay recent history do not observe holes.
const DEFAULT_MIN_LOG_COMPACTION_LAG_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_CONFIG_CACHE_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_CONFIG_CACHE_MAX_CAPACITY: u64 = 1024;

/// Configuration for [`crate::TopicManager`].
#[derive(Debug, Clone)]
pub struct TopicManagerConfig {
    /// Deadline for blocking broker operations (create, delete, alter)
    pub operation_timeout_ms: u64,

    /// Much shorter deadline used when the caller asks for a non-blocking
    /// flavor of topic creation
    pub fast_operation_timeout_ms: u64,

    /// Sleep between existence checks while waiting out a legacy delete
    pub topic_deletion_status_poll_interval_ms: u64,

    /// `min.compaction.lag.ms` applied to compacted topics
    pub min_log_compaction_lag_ms: u64,

    /// Whether a delete may be issued while another one is underway
    pub allow_concurrent_topic_deletion: bool,

    /// Advisory config cache entry lifetime
    pub topic_config_cache_ttl_ms: u64,

    /// Advisory config cache entry bound
    pub topic_config_cache_max_capacity: u64,
}

impl Default for TopicManagerConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            fast_operation_timeout_ms: FAST_OPERATION_TIMEOUT_MS,
            topic_deletion_status_poll_interval_ms: DEFAULT_DELETION_STATUS_POLL_INTERVAL_MS,
            min_log_compaction_lag_ms: DEFAULT_MIN_LOG_COMPACTION_LAG_MS,
            allow_concurrent_topic_deletion: false,
            topic_config_cache_ttl_ms: DEFAULT_CONFIG_CACHE_TTL_MS,
            topic_config_cache_max_capacity: DEFAULT_CONFIG_CACHE_MAX_CAPACITY,
        }
    }
}

impl TopicManagerConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            operation_timeout_ms: env_parse(
                "STRATUS_TOPIC_OPERATION_TIMEOUT_MS",
                defaults.operation_timeout_ms,
            ),
            fast_operation_timeout_ms: defaults.fast_operation_timeout_ms,
            topic_deletion_status_poll_interval_ms: env_parse(
                "STRATUS_TOPIC_DELETION_STATUS_POLL_INTERVAL_MS",
                defaults.topic_deletion_status_poll_interval_ms,
            ),
            min_log_compaction_lag_ms: env_parse(
                "STRATUS_TOPIC_MIN_LOG_COMPACTION_LAG_MS",
                defaults.min_log_compaction_lag_ms,
            ),
            allow_concurrent_topic_deletion: env_parse(
                "STRATUS_TOPIC_ALLOW_CONCURRENT_DELETION",
                defaults.allow_concurrent_topic_deletion,
            ),
            topic_config_cache_ttl_ms: env_parse(
                "STRATUS_TOPIC_CONFIG_CACHE_TTL_MS",
                defaults.topic_config_cache_ttl_ms,
            ),
            topic_config_cache_max_capacity: env_parse(
                "STRATUS_TOPIC_CONFIG_CACHE_MAX_CAPACITY",
                defaults.topic_config_cache_max_capacity,
            ),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn fast_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_operation_timeout_ms)
    }

    pub fn topic_deletion_status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.topic_deletion_status_poll_interval_ms)
    }

    pub fn topic_config_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.topic_config_cache_ttl_ms)
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

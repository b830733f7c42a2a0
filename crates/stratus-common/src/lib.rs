//! Common types and utilities shared across Stratus components.

pub mod error;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CleanupPolicy, Offset, PartitionInfo, Timestamp, TopicPartition, TopicProperties,
    CLEANUP_POLICY_CONFIG, LOG_APPEND_TIME, LOWEST_OFFSET, MESSAGE_TIMESTAMP_TYPE_CONFIG,
    MIN_COMPACTION_LAG_MS_CONFIG, MIN_INSYNC_REPLICAS_CONFIG, RETENTION_MS_CONFIG,
};

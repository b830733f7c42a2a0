//! Common types used throughout Stratus.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic and partition identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Offset within a partition.
pub type Offset = i64;

/// Timestamp in milliseconds since epoch.
pub type Timestamp = i64;

/// Sentinel meaning "no offset consumed yet, start from the earliest available".
pub const LOWEST_OFFSET: Offset = -1;

/// Per-partition metadata as reported by the broker fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub topic: String,
    pub partition: i32,
    /// Total replica count for this partition.
    pub replicas: i32,
    /// Replicas currently caught up within broker tolerance.
    pub in_sync_replicas: i32,
}

impl PartitionInfo {
    /// Readiness predicate: a partition is available once at least one
    /// replica is in sync.
    pub fn has_in_sync_replicas(&self) -> bool {
        self.in_sync_replicas > 0
    }
}

/// Cleanup policy for topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    Delete,
    Compact,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::Delete
    }
}

impl CleanupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPolicy::Delete => "delete",
            CleanupPolicy::Compact => "compact",
        }
    }

    /// Unknown or missing values read as `Delete`, the broker default.
    pub fn parse(value: &str) -> Self {
        match value {
            "compact" => CleanupPolicy::Compact,
            _ => CleanupPolicy::Delete,
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum record age before deletion, in milliseconds.
pub const RETENTION_MS_CONFIG: &str = "retention.ms";
/// `delete` or `compact`.
pub const CLEANUP_POLICY_CONFIG: &str = "cleanup.policy";
/// Minimum record age before compaction is allowed, in milliseconds.
pub const MIN_COMPACTION_LAG_MS_CONFIG: &str = "min.compaction.lag.ms";
/// Minimum in-sync replicas required for a produce to succeed.
pub const MIN_INSYNC_REPLICAS_CONFIG: &str = "min.insync.replicas";
/// `CreateTime` or `LogAppendTime`.
pub const MESSAGE_TIMESTAMP_TYPE_CONFIG: &str = "message.timestamp.type";
pub const LOG_APPEND_TIME: &str = "LogAppendTime";

/// Topic configuration property set: a mapping from configuration key to
/// string value, passed verbatim to and from the broker.
///
/// The typed accessors below parse the handful of keys the topic manager
/// interprets; everything else flows through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProperties {
    entries: BTreeMap<String, String>,
}

impl TopicProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry of `other` is present here with the same value.
    pub fn contains_all(&self, other: &TopicProperties) -> bool {
        other
            .iter()
            .all(|(k, v)| self.get(k).map_or(false, |mine| mine == v))
    }

    pub fn retention_ms(&self) -> Option<i64> {
        self.get(RETENTION_MS_CONFIG).and_then(|v| v.parse().ok())
    }

    pub fn set_retention_ms(&mut self, retention_ms: i64) {
        self.set(RETENTION_MS_CONFIG, retention_ms.to_string());
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        self.get(CLEANUP_POLICY_CONFIG)
            .map(CleanupPolicy::parse)
            .unwrap_or_default()
    }

    pub fn set_cleanup_policy(&mut self, policy: CleanupPolicy) {
        self.set(CLEANUP_POLICY_CONFIG, policy.as_str());
    }

    /// Missing means compaction may run immediately, i.e. a lag of zero.
    pub fn min_compaction_lag_ms(&self) -> i64 {
        self.get(MIN_COMPACTION_LAG_MS_CONFIG)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_min_compaction_lag_ms(&mut self, lag_ms: i64) {
        self.set(MIN_COMPACTION_LAG_MS_CONFIG, lag_ms.to_string());
    }

    pub fn min_insync_replicas(&self) -> Option<i32> {
        self.get(MIN_INSYNC_REPLICAS_CONFIG)
            .and_then(|v| v.parse().ok())
    }

    pub fn set_min_insync_replicas(&mut self, min_isr: i32) {
        self.set(MIN_INSYNC_REPLICAS_CONFIG, min_isr.to_string());
    }

    pub fn set_log_append_timestamp_type(&mut self) {
        self.set(MESSAGE_TIMESTAMP_TYPE_CONFIG, LOG_APPEND_TIME);
    }
}

impl FromIterator<(String, String)> for TopicProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

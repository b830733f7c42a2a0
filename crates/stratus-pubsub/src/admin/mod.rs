//! Typed admin façade over the raw broker admin protocol.
//!
//! Two disjoint roles share this trait: a *read-only* admin (existence,
//! configs, listings) and a *write-only* admin (create, delete, alter).
//! The roles may be backed by different implementations and must not be
//! assumed to share connection state.

pub mod instrumented;
pub mod kafka;
pub mod memory;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use stratus_common::{Result, TopicProperties};

pub use instrumented::InstrumentedTopicAdmin;
pub use kafka::KafkaTopicAdmin;
pub use memory::{MemoryBrokerHandle, MemoryTopicAdmin};

/// Retention value reported for topics whose `retention.ms` is missing or
/// unparsable.
pub const UNKNOWN_TOPIC_RETENTION: i64 = i64::MIN;

/// Completion handle for an asynchronous topic deletion. `None` from
/// [`TopicAdmin::delete_topic`] means the implementation cannot provide
/// one and callers must poll for disappearance instead.
pub type DeleteTopicFuture = BoxFuture<'static, Result<()>>;

/// Capability surface over the broker admin protocol.
///
/// Implementations translate broker-level "unknown topic or partition"
/// responses into [`stratus_common::Error::TopicDoesNotExist`] so callers
/// never see raw protocol codes.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Request topic creation. Fails with `TopicExists`,
    /// `InvalidReplicationFactor` (retriable) or `Transient` (retriable).
    async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        props: &TopicProperties,
    ) -> Result<()>;

    /// Initiate deletion. The returned future completes when the broker
    /// confirms; `None` means the caller must poll.
    async fn delete_topic(&self, topic: &str) -> Result<Option<DeleteTopicFuture>>;

    /// Idempotent alter-config.
    async fn set_topic_config(&self, topic: &str, props: &TopicProperties) -> Result<()>;

    async fn get_topic_config(&self, topic: &str) -> Result<TopicProperties>;

    /// Like [`Self::get_topic_config`], retrying transient faults for the
    /// implementation's configured window.
    async fn get_topic_config_with_retry(&self, topic: &str) -> Result<TopicProperties>;

    /// Batch config fetch. Topics that do not exist are absent from the
    /// result rather than failing the whole batch.
    async fn get_some_topic_configs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<String, TopicProperties>>;

    /// Retention per topic; [`UNKNOWN_TOPIC_RETENTION`] when unset.
    async fn get_all_topic_retentions(&self) -> Result<HashMap<String, i64>>;

    async fn contains_topic(&self, topic: &str) -> Result<bool>;

    async fn list_all_topics(&self) -> Result<HashSet<String>>;

    /// Whether a topic deletion is currently in flight.
    async fn is_topic_deletion_underway(&self) -> Result<bool>;

    /// Implementation name for logs and metric keys.
    fn class_name(&self) -> &'static str;

    /// Best-effort teardown; never fails.
    async fn close(&self);

    /// Poll [`Self::contains_topic`] until it matches `expected`, backing
    /// off exponentially between `initial_backoff` and `max_backoff`.
    /// Errors count as non-matching attempts. Returns `false` once
    /// `max_attempts` or `max_duration` is exhausted.
    async fn contains_topic_with_expectation_and_retry(
        &self,
        topic: &str,
        max_attempts: u32,
        expected: bool,
        initial_backoff: Duration,
        max_backoff: Duration,
        max_duration: Duration,
    ) -> bool {
        let start = Instant::now();
        let mut backoff = initial_backoff;
        for attempt in 1..=max_attempts.max(1) {
            match self.contains_topic(topic).await {
                Ok(actual) if actual == expected => return true,
                Ok(actual) => {
                    warn!(
                        topic,
                        attempt, expected, actual, "Topic existence does not match expectation yet"
                    );
                }
                Err(e) => {
                    warn!(topic, attempt, error = %e, "Topic existence check failed");
                }
            }
            if attempt == max_attempts || start.elapsed() + backoff > max_duration {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
        false
    }
}

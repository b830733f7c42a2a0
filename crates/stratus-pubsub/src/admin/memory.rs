//! In-memory implementation of [`TopicAdmin`] for testing.
//!
//! Models a single broker's topic table with scripted fault injection so
//! unit and integration tests can drive the retry, recovery and deletion
//! paths without a cluster.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::debug;

use stratus_common::{Error, PartitionInfo, Result, TopicProperties};

use super::{DeleteTopicFuture, TopicAdmin, UNKNOWN_TOPIC_RETENTION};

#[derive(Debug, Clone)]
struct MemoryTopic {
    partitions: i32,
    replication: i32,
    props: TopicProperties,
    /// Partitions reporting at least one in-sync replica.
    in_sync: bool,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, MemoryTopic>,
    deletion_underway: bool,
    /// Errors handed out by `create_topic` before it starts succeeding.
    create_errors: VecDeque<Error>,
    /// When set, the next delete future resolves with this error.
    delete_future_error: Option<Error>,
    /// `false` makes `delete_topic` return no future (legacy admin).
    delete_returns_future: bool,
    /// Legacy mode: topic vanishes after this many existence checks.
    legacy_disappear_after_checks: Option<u32>,
    pending_legacy_delete: Option<String>,
    checks_since_legacy_delete: u32,
    create_calls: u32,
    set_config_calls: u32,
    delete_calls: u32,
}

/// Shared handle onto the broker model; clones observe the same state.
#[derive(Clone)]
pub struct MemoryBrokerHandle {
    state: Arc<RwLock<BrokerState>>,
}

impl MemoryBrokerHandle {
    /// Seed a topic directly, bypassing the admin surface.
    pub fn seed_topic(&self, topic: &str, partitions: i32, replication: i32, props: TopicProperties) {
        self.state.write().topics.insert(
            topic.to_string(),
            MemoryTopic {
                partitions,
                replication,
                props,
                in_sync: true,
            },
        );
    }

    pub fn set_in_sync(&self, topic: &str, in_sync: bool) {
        if let Some(t) = self.state.write().topics.get_mut(topic) {
            t.in_sync = in_sync;
        }
    }

    pub fn set_deletion_underway(&self, underway: bool) {
        self.state.write().deletion_underway = underway;
    }

    pub fn push_create_error(&self, error: Error) {
        self.state.write().create_errors.push_back(error);
    }

    pub fn set_delete_future_error(&self, error: Error) {
        self.state.write().delete_future_error = Some(error);
    }

    /// Switch to the legacy delete protocol: no confirmation future, the
    /// topic disappears after `checks` existence checks (`None` = never).
    pub fn use_legacy_delete(&self, checks: Option<u32>) {
        let mut state = self.state.write();
        state.delete_returns_future = false;
        state.legacy_disappear_after_checks = checks;
    }

    pub fn topic_props(&self, topic: &str) -> Option<TopicProperties> {
        self.state.read().topics.get(topic).map(|t| t.props.clone())
    }

    /// Broker metadata view, as a consumer would observe it.
    pub fn partition_infos(&self, topic: &str) -> Option<Vec<PartitionInfo>> {
        let state = self.state.read();
        state.topics.get(topic).map(|t| {
            (0..t.partitions)
                .map(|partition| PartitionInfo {
                    topic: topic.to_string(),
                    partition,
                    replicas: t.replication,
                    in_sync_replicas: if t.in_sync { t.replication } else { 0 },
                })
                .collect()
        })
    }

    pub fn create_calls(&self) -> u32 {
        self.state.read().create_calls
    }

    pub fn set_config_calls(&self) -> u32 {
        self.state.read().set_config_calls
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.read().delete_calls
    }
}

/// In-memory admin client.
#[derive(Clone)]
pub struct MemoryTopicAdmin {
    state: Arc<RwLock<BrokerState>>,
}

impl MemoryTopicAdmin {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BrokerState {
                delete_returns_future: true,
                ..Default::default()
            })),
        }
    }

    /// Handle for seeding state and scripting faults from tests.
    pub fn handle(&self) -> MemoryBrokerHandle {
        MemoryBrokerHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MemoryTopicAdmin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicAdmin for MemoryTopicAdmin {
    async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        props: &TopicProperties,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.create_calls += 1;
        if let Some(error) = state.create_errors.pop_front() {
            return Err(error);
        }
        if state.topics.contains_key(topic) {
            return Err(Error::TopicExists(topic.to_string()));
        }
        state.topics.insert(
            topic.to_string(),
            MemoryTopic {
                partitions,
                replication,
                props: props.clone(),
                in_sync: true,
            },
        );
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<Option<DeleteTopicFuture>> {
        let mut state = self.state.write();
        state.delete_calls += 1;

        if !state.delete_returns_future {
            state.pending_legacy_delete = Some(topic.to_string());
            state.checks_since_legacy_delete = 0;
            return Ok(None);
        }

        let scripted_error = state.delete_future_error.take();
        let shared = Arc::clone(&self.state);
        let topic = topic.to_string();
        let future = async move {
            match scripted_error {
                Some(error) => {
                    // An unknown-topic completion still means the broker got
                    // rid of the topic.
                    if matches!(error, Error::TopicDoesNotExist(_)) {
                        shared.write().topics.remove(&topic);
                    }
                    Err(error)
                }
                None => {
                    shared.write().topics.remove(&topic);
                    Ok(())
                }
            }
        }
        .boxed();
        Ok(Some(future))
    }

    async fn set_topic_config(&self, topic: &str, props: &TopicProperties) -> Result<()> {
        let mut state = self.state.write();
        state.set_config_calls += 1;
        match state.topics.get_mut(topic) {
            Some(t) => {
                t.props = props.clone();
                Ok(())
            }
            None => Err(Error::TopicDoesNotExist(topic.to_string())),
        }
    }

    async fn get_topic_config(&self, topic: &str) -> Result<TopicProperties> {
        self.state
            .read()
            .topics
            .get(topic)
            .map(|t| t.props.clone())
            .ok_or_else(|| Error::TopicDoesNotExist(topic.to_string()))
    }

    async fn get_topic_config_with_retry(&self, topic: &str) -> Result<TopicProperties> {
        self.get_topic_config(topic).await
    }

    async fn get_some_topic_configs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<String, TopicProperties>> {
        let state = self.state.read();
        Ok(topics
            .iter()
            .filter_map(|name| {
                state
                    .topics
                    .get(name)
                    .map(|t| (name.clone(), t.props.clone()))
            })
            .collect())
    }

    async fn get_all_topic_retentions(&self) -> Result<HashMap<String, i64>> {
        let state = self.state.read();
        Ok(state
            .topics
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    t.props.retention_ms().unwrap_or(UNKNOWN_TOPIC_RETENTION),
                )
            })
            .collect())
    }

    async fn contains_topic(&self, topic: &str) -> Result<bool> {
        let mut state = self.state.write();
        if state.pending_legacy_delete.as_deref() == Some(topic) {
            state.checks_since_legacy_delete += 1;
            if let Some(limit) = state.legacy_disappear_after_checks {
                if state.checks_since_legacy_delete >= limit {
                    state.topics.remove(topic);
                    state.pending_legacy_delete = None;
                }
            }
        }
        Ok(state.topics.contains_key(topic))
    }

    async fn list_all_topics(&self) -> Result<HashSet<String>> {
        Ok(self.state.read().topics.keys().cloned().collect())
    }

    async fn is_topic_deletion_underway(&self) -> Result<bool> {
        Ok(self.state.read().deletion_underway)
    }

    fn class_name(&self) -> &'static str {
        "MemoryTopicAdmin"
    }

    async fn close(&self) {
        debug!("Closing in-memory admin client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_contains() {
        let admin = MemoryTopicAdmin::new();
        let props = TopicProperties::new();
        admin.create_topic("orders", 4, 3, &props).await.unwrap();
        assert!(admin.contains_topic("orders").await.unwrap());
        assert!(matches!(
            admin.create_topic("orders", 4, 3, &props).await,
            Err(Error::TopicExists(_))
        ));
    }

    #[tokio::test]
    async fn test_scripted_create_errors_drain() {
        let admin = MemoryTopicAdmin::new();
        let handle = admin.handle();
        handle.push_create_error(Error::Transient("not yet".into()));

        let props = TopicProperties::new();
        assert!(admin.create_topic("t", 1, 1, &props).await.is_err());
        assert!(admin.create_topic("t", 1, 1, &props).await.is_ok());
        assert_eq!(handle.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_future_removes_topic() {
        let admin = MemoryTopicAdmin::new();
        admin
            .create_topic("t", 1, 1, &TopicProperties::new())
            .await
            .unwrap();
        let future = admin.delete_topic("t").await.unwrap().expect("a future");
        future.await.unwrap();
        assert!(!admin.contains_topic("t").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_delete_disappears_after_checks() {
        let admin = MemoryTopicAdmin::new();
        let handle = admin.handle();
        admin
            .create_topic("t", 1, 1, &TopicProperties::new())
            .await
            .unwrap();
        handle.use_legacy_delete(Some(2));

        assert!(admin.delete_topic("t").await.unwrap().is_none());
        assert!(admin.contains_topic("t").await.unwrap());
        assert!(!admin.contains_topic("t").await.unwrap());
    }

    #[tokio::test]
    async fn test_expectation_retry_gives_up() {
        use std::time::Duration;
        let admin = MemoryTopicAdmin::new();
        let found = admin
            .contains_topic_with_expectation_and_retry(
                "ghost",
                3,
                true,
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(50),
            )
            .await;
        assert!(!found);
    }
}

//! Metrics decorator for [`TopicAdmin`] implementations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use stratus_common::{Result, TopicProperties};
use stratus_monitoring::AdminMetrics;

use super::{DeleteTopicFuture, TopicAdmin};

/// Records per-operation counters and latency for an inner admin client.
///
/// The metric key is composed of the inner implementation's class name and
/// the bootstrap URL, so several clusters can coexist in one process.
pub struct InstrumentedTopicAdmin {
    inner: Arc<dyn TopicAdmin>,
    metrics: AdminMetrics,
}

impl InstrumentedTopicAdmin {
    pub fn new(
        inner: Arc<dyn TopicAdmin>,
        registry: &stratus_monitoring::MetricsRegistry,
        bootstrap_servers: &str,
    ) -> Self {
        let unique_name = format!("{}_{}", inner.class_name(), bootstrap_servers);
        let metrics = registry.admin(unique_name);
        Self { inner, metrics }
    }

    async fn record<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = fut.await;
        self.metrics.record_operation(
            operation,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }
}

#[async_trait]
impl TopicAdmin for InstrumentedTopicAdmin {
    async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        props: &TopicProperties,
    ) -> Result<()> {
        self.record(
            "create_topic",
            self.inner.create_topic(topic, partitions, replication, props),
        )
        .await
    }

    async fn delete_topic(&self, topic: &str) -> Result<Option<DeleteTopicFuture>> {
        self.record("delete_topic", self.inner.delete_topic(topic))
            .await
    }

    async fn set_topic_config(&self, topic: &str, props: &TopicProperties) -> Result<()> {
        self.record("set_topic_config", self.inner.set_topic_config(topic, props))
            .await
    }

    async fn get_topic_config(&self, topic: &str) -> Result<TopicProperties> {
        self.record("get_topic_config", self.inner.get_topic_config(topic))
            .await
    }

    async fn get_topic_config_with_retry(&self, topic: &str) -> Result<TopicProperties> {
        self.record(
            "get_topic_config_with_retry",
            self.inner.get_topic_config_with_retry(topic),
        )
        .await
    }

    async fn get_some_topic_configs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<String, TopicProperties>> {
        self.record(
            "get_some_topic_configs",
            self.inner.get_some_topic_configs(topics),
        )
        .await
    }

    async fn get_all_topic_retentions(&self) -> Result<HashMap<String, i64>> {
        self.record(
            "get_all_topic_retentions",
            self.inner.get_all_topic_retentions(),
        )
        .await
    }

    async fn contains_topic(&self, topic: &str) -> Result<bool> {
        self.record("contains_topic", self.inner.contains_topic(topic))
            .await
    }

    async fn list_all_topics(&self) -> Result<HashSet<String>> {
        self.record("list_all_topics", self.inner.list_all_topics())
            .await
    }

    async fn is_topic_deletion_underway(&self) -> Result<bool> {
        self.inner.is_topic_deletion_underway().await
    }

    fn class_name(&self) -> &'static str {
        self.inner.class_name()
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

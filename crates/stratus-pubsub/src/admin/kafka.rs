//! Kafka admin client implementation backed by rdkafka.
//!
//! All translation from broker error codes into the Stratus error taxonomy
//! happens here; nothing above this layer sees raw protocol codes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tracing::{debug, warn};

use stratus_common::{retry, Error, Result, TopicProperties};

use crate::config::AdminConfig;
use crate::factory::SslConfig;

use super::{DeleteTopicFuture, TopicAdmin, UNKNOWN_TOPIC_RETENTION};

/// Admin client over the Kafka wire protocol.
pub struct KafkaTopicAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    config: AdminConfig,
    operation_timeout: Duration,
    /// Deletes issued by this client whose confirmation future has not
    /// resolved yet.
    deletes_in_flight: Arc<AtomicUsize>,
}

impl KafkaTopicAdmin {
    pub fn new(
        bootstrap_servers: &str,
        ssl: Option<&SslConfig>,
        config: AdminConfig,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers)
            .set(
                "receive.buffer.bytes",
                config.receive_buffer_bytes.to_string(),
            );
        if let Some(ssl) = ssl {
            ssl.apply(&mut client_config);
        }

        let admin: AdminClient<DefaultClientContext> = client_config
            .create()
            .map_err(|e| map_kafka_error("<admin>", e))?;

        Ok(Self {
            admin: Arc::new(admin),
            config,
            operation_timeout,
            deletes_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn admin_options(&self) -> AdminOptions {
        AdminOptions::new()
            .operation_timeout(Some(self.operation_timeout))
            .request_timeout(Some(self.operation_timeout))
    }

    fn topic_names(&self, topic: Option<&str>) -> Result<HashSet<String>> {
        let metadata = self
            .admin
            .inner()
            .fetch_metadata(topic, self.operation_timeout)
            .map_err(|e| map_kafka_error(topic.unwrap_or("<all>"), e))?;
        Ok(metadata
            .topics()
            .iter()
            .filter(|t| t.error().is_none() && !t.partitions().is_empty())
            .map(|t| t.name().to_string())
            .collect())
    }
}

#[async_trait]
impl TopicAdmin for KafkaTopicAdmin {
    async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        props: &TopicProperties,
    ) -> Result<()> {
        let mut new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(replication));
        for (key, value) in props.iter() {
            new_topic = new_topic.set(key, value);
        }

        let results = self
            .admin
            .create_topics(&[new_topic], &self.admin_options())
            .await
            .map_err(|e| map_kafka_error(topic, e))?;

        for result in results {
            result.map_err(|(name, code)| map_error_code(&name, code))?;
        }
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<Option<DeleteTopicFuture>> {
        let admin = Arc::clone(&self.admin);
        let opts = self.admin_options();
        let topic = topic.to_string();
        let guard = InFlightGuard::enter(&self.deletes_in_flight);

        let future = async move {
            let _guard = guard;
            let results = admin
                .delete_topics(&[topic.as_str()], &opts)
                .await
                .map_err(|e| map_kafka_error(&topic, e))?;
            match results.into_iter().next() {
                Some(Ok(_)) => Ok(()),
                Some(Err((name, code))) => Err(map_error_code(&name, code)),
                None => Err(Error::Broker(format!(
                    "empty delete response for topic: {topic}"
                ))),
            }
        }
        .boxed();

        Ok(Some(future))
    }

    async fn set_topic_config(&self, topic: &str, props: &TopicProperties) -> Result<()> {
        let mut alter = AlterConfig::new(ResourceSpecifier::Topic(topic));
        for (key, value) in props.iter() {
            alter = alter.set(key, value);
        }

        let results = self
            .admin
            .alter_configs(&[alter], &self.admin_options())
            .await
            .map_err(|e| map_kafka_error(topic, e))?;

        for result in results {
            result.map_err(|(_, code)| map_error_code(topic, code))?;
        }
        Ok(())
    }

    async fn get_topic_config(&self, topic: &str) -> Result<TopicProperties> {
        // The describe-configs protocol answers with broker defaults for
        // absent topics on some broker versions, so existence is checked
        // explicitly first.
        if !self.contains_topic(topic).await? {
            return Err(Error::TopicDoesNotExist(topic.to_string()));
        }

        let results = self
            .admin
            .describe_configs(
                &[ResourceSpecifier::Topic(topic)],
                &self.admin_options(),
            )
            .await
            .map_err(|e| map_kafka_error(topic, e))?;

        let resource = results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Broker(format!("empty describe response for topic: {topic}")))?
            .map_err(|code| map_error_code(topic, code))?;

        Ok(resource
            .entries
            .into_iter()
            .filter_map(|entry| entry.value.map(|v| (entry.name, v)))
            .collect())
    }

    async fn get_topic_config_with_retry(&self, topic: &str) -> Result<TopicProperties> {
        let retry_config = retry::RetryConfig {
            timeout: self.config.get_topic_config_max_retry(),
            max_attempts: u32::MAX,
            ..Default::default()
        };
        retry::retry_async(
            retry_config,
            "get_topic_config",
            Error::is_retryable,
            || self.get_topic_config(topic),
        )
        .await
    }

    async fn get_some_topic_configs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<String, TopicProperties>> {
        let mut configs = HashMap::with_capacity(topics.len());
        for topic in topics {
            match self.get_topic_config(topic).await {
                Ok(props) => {
                    configs.insert(topic.clone(), props);
                }
                Err(Error::TopicDoesNotExist(_)) => {
                    debug!(topic, "Skipping config of absent topic in batch fetch");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(configs)
    }

    async fn get_all_topic_retentions(&self) -> Result<HashMap<String, i64>> {
        let names: Vec<String> = self.topic_names(None)?.into_iter().collect();
        let configs = self.get_some_topic_configs(&names).await?;
        Ok(names
            .into_iter()
            .map(|name| {
                let retention = configs
                    .get(&name)
                    .and_then(TopicProperties::retention_ms)
                    .unwrap_or(UNKNOWN_TOPIC_RETENTION);
                (name, retention)
            })
            .collect())
    }

    async fn contains_topic(&self, topic: &str) -> Result<bool> {
        Ok(self.topic_names(Some(topic))?.contains(topic))
    }

    async fn list_all_topics(&self) -> Result<HashSet<String>> {
        self.topic_names(None)
    }

    async fn is_topic_deletion_underway(&self) -> Result<bool> {
        Ok(self.deletes_in_flight.load(Ordering::Acquire) > 0)
    }

    fn class_name(&self) -> &'static str {
        "KafkaTopicAdmin"
    }

    async fn close(&self) {
        // Connections are torn down on drop; nothing to flush.
        debug!("Closing Kafka admin client");
    }
}

/// Decrements the in-flight delete counter when the confirmation future
/// resolves or is dropped.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Map an rdkafka error into the Stratus taxonomy.
pub(crate) fn map_kafka_error(topic: &str, error: KafkaError) -> Error {
    match error.rdkafka_error_code() {
        Some(code) => map_error_code(topic, code),
        None => Error::Broker(error.to_string()),
    }
}

pub(crate) fn map_error_code(topic: &str, code: RDKafkaErrorCode) -> Error {
    match code {
        RDKafkaErrorCode::TopicAlreadyExists => Error::TopicExists(topic.to_string()),
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
            Error::TopicDoesNotExist(topic.to_string())
        }
        RDKafkaErrorCode::InvalidReplicationFactor => Error::InvalidReplicationFactor {
            topic: topic.to_string(),
        },
        RDKafkaErrorCode::RequestTimedOut
        | RDKafkaErrorCode::OperationTimedOut
        | RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::LeaderNotAvailable
        | RDKafkaErrorCode::NotEnoughReplicas
        | RDKafkaErrorCode::NetworkException => {
            warn!(topic, code = ?code, "Transient broker error");
            Error::Transient(format!("{code} (topic: {topic})"))
        }
        other => Error::Broker(format!("{other} (topic: {topic})")),
    }
}

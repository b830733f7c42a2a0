//! Raw consumer implementation backed by rdkafka's `BaseConsumer`.
//!
//! Manual partition assignment only; the consumer group protocol is never
//! engaged. Like the underlying client, this type must not be shared across
//! threads without external serialization.

use std::time::{Duration, Instant};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::Message;
use tracing::{debug, warn};

use stratus_common::{Error, PartitionInfo, Result, TopicPartition};

use crate::admin::kafka::map_kafka_error;
use crate::config::ConsumerConfig;
use crate::factory::SslConfig;

use super::{ConsumerRecord, RawConsumer};

/// Upper bound on records returned by one poll batch.
const MAX_POLL_BATCH: usize = 500;

pub struct KafkaRawConsumer {
    consumer: BaseConsumer,
    metadata_timeout: Duration,
}

impl KafkaRawConsumer {
    pub fn new(
        bootstrap_servers: &str,
        ssl: Option<&SslConfig>,
        config: &ConsumerConfig,
        metadata_timeout: Duration,
    ) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers)
            .set(
                "group.id",
                format!("stratus-observer-{}", std::process::id()),
            )
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set(
                "receive.buffer.bytes",
                config.receive_buffer_bytes.to_string(),
            );
        if let Some(ssl) = ssl {
            ssl.apply(&mut client_config);
        }

        let consumer: BaseConsumer = client_config
            .create()
            .map_err(|e| map_kafka_error("<consumer>", e))?;

        Ok(Self {
            consumer,
            metadata_timeout,
        })
    }

    fn to_tpl(partitions: &[TopicPartition]) -> TopicPartitionList {
        let mut tpl = TopicPartitionList::new();
        for tp in partitions {
            tpl.add_partition(&tp.topic, tp.partition);
        }
        tpl
    }
}

impl RawConsumer for KafkaRawConsumer {
    fn assign(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.consumer
            .assign(&Self::to_tpl(partitions))
            .map_err(|e| map_kafka_error("<assign>", e))
    }

    fn assignment(&self) -> Result<Vec<TopicPartition>> {
        let tpl = self
            .consumer
            .assignment()
            .map_err(|e| map_kafka_error("<assignment>", e))?;
        Ok(tpl
            .elements()
            .iter()
            .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
            .collect())
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<()> {
        self.consumer
            .seek(
                &tp.topic,
                tp.partition,
                Offset::Offset(offset),
                self.metadata_timeout,
            )
            .map_err(|e| map_kafka_error(&tp.topic, e))
    }

    fn seek_to_beginning(&self, partitions: &[TopicPartition]) -> Result<()> {
        for tp in partitions {
            self.consumer
                .seek(
                    &tp.topic,
                    tp.partition,
                    Offset::Beginning,
                    self.metadata_timeout,
                )
                .map_err(|e| map_kafka_error(&tp.topic, e))?;
        }
        Ok(())
    }

    fn pause(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.consumer
            .pause(&Self::to_tpl(partitions))
            .map_err(|e| map_kafka_error("<pause>", e))
    }

    fn resume(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.consumer
            .resume(&Self::to_tpl(partitions))
            .map_err(|e| map_kafka_error("<resume>", e))
    }

    fn poll(&self, timeout: Duration) -> Result<Vec<ConsumerRecord>> {
        let deadline = Instant::now() + timeout;
        let mut records = Vec::new();

        loop {
            let remaining = if records.is_empty() {
                deadline.saturating_duration_since(Instant::now())
            } else {
                // Once the batch has started, only drain what is already
                // buffered locally.
                Duration::ZERO
            };

            match self.consumer.poll(remaining) {
                Some(Ok(message)) => {
                    records.push(ConsumerRecord {
                        topic_partition: TopicPartition::new(
                            message.topic(),
                            message.partition(),
                        ),
                        offset: message.offset(),
                        producer_timestamp_ms: message.timestamp().to_millis().unwrap_or(-1),
                        key: message.key().map(|k| k.to_vec()),
                        value: message.payload().map(|p| p.to_vec()),
                        // librdkafka filters control records before delivery.
                        control: false,
                    });
                    if records.len() >= MAX_POLL_BATCH {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let error = map_kafka_error("<poll>", e);
                    if records.is_empty() {
                        return Err(error);
                    }
                    warn!(error = %error, "Poll error after a partial batch, returning what we have");
                    break;
                }
                None => break,
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        Ok(records)
    }

    fn beginning_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64> {
        let (low, _high) = self
            .consumer
            .fetch_watermarks(&tp.topic, tp.partition, timeout)
            .map_err(|e| map_kafka_error(&tp.topic, e))?;
        Ok(low)
    }

    fn end_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64> {
        let (_low, high) = self
            .consumer
            .fetch_watermarks(&tp.topic, tp.partition, timeout)
            .map_err(|e| map_kafka_error(&tp.topic, e))?;
        Ok(high)
    }

    fn offset_for_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
        timeout: Duration,
    ) -> Result<Option<i64>> {
        let mut query = TopicPartitionList::new();
        query
            .add_partition_offset(&tp.topic, tp.partition, Offset::Offset(timestamp_ms))
            .map_err(|e| map_kafka_error(&tp.topic, e))?;

        let answer = self
            .consumer
            .offsets_for_times(query, timeout)
            .map_err(|e| map_kafka_error(&tp.topic, e))?;

        match answer.elements().first().map(|elem| elem.offset()) {
            Some(Offset::Offset(offset)) => Ok(Some(offset)),
            _ => Ok(None),
        }
    }

    fn partitions_for(&self, topic: &str, timeout: Duration) -> Result<Vec<PartitionInfo>> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), timeout)
            .map_err(|e| map_kafka_error(topic, e))?;

        let topic_metadata = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| Error::TopicDoesNotExist(topic.to_string()))?;
        if topic_metadata.error().is_some() {
            return Err(Error::TopicDoesNotExist(topic.to_string()));
        }

        Ok(topic_metadata
            .partitions()
            .iter()
            .map(|p| PartitionInfo {
                topic: topic.to_string(),
                partition: p.id(),
                replicas: p.replicas().len() as i32,
                in_sync_replicas: p.isr().len() as i32,
            })
            .collect())
    }

    fn close(&mut self) {
        debug!("Closing raw Kafka consumer");
        if let Err(e) = self.consumer.unassign() {
            warn!(error = %e, "Raw consumer unassign failed during close");
        }
    }
}

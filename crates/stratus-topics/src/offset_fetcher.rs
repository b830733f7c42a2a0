//! Retry-hardened offset and metadata queries over a shared raw consumer.
//!
//! The wrapped consumer is not thread-safe, so every operation serializes
//! through one non-reentrant async mutex. The lock is held for the whole
//! retry cycle of an operation (broker queries and retry sleeps included);
//! callers waiting on the mutex make no progress until the cycle finishes,
//! by contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use stratus_common::{retry, Error, PartitionInfo, Result, TopicPartition};
use stratus_pubsub::{ConsumerRecord, PartitionConsumer};

use crate::lazy::LazyAdmin;

/// Builds a fresh subscription engine; used at construction time and when
/// the observation consumer needs to be shaken off stale metadata.
pub type ConsumerBuilder = Arc<dyn Fn() -> Result<PartitionConsumer> + Send + Sync>;

/// Delay between attempts of the fixed-retry offset queries.
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Per-poll timeout while scanning a partition tail.
const TAIL_SCAN_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PartitionOffsetFetcher {
    read_admin: Arc<LazyAdmin>,
    consumer: Mutex<PartitionConsumer>,
    consumer_builder: ConsumerBuilder,
    operation_timeout: Duration,
}

impl PartitionOffsetFetcher {
    pub(crate) fn new(
        read_admin: Arc<LazyAdmin>,
        consumer_builder: ConsumerBuilder,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let consumer = consumer_builder()?;
        Ok(Self {
            read_admin,
            consumer: Mutex::new(consumer),
            consumer_builder,
            operation_timeout,
        })
    }

    /// Latest offset per partition of `topic`, or an empty map when
    /// anything goes wrong.
    pub async fn get_topic_latest_offsets(&self, topic: &str) -> HashMap<i32, i64> {
        match self.try_topic_latest_offsets(topic).await {
            Ok(offsets) => offsets,
            Err(e) => {
                warn!(topic, error = %e, "Failed to fetch latest offsets, returning empty map");
                HashMap::new()
            }
        }
    }

    async fn try_topic_latest_offsets(&self, topic: &str) -> Result<HashMap<i32, i64>> {
        let admin = self.read_admin.get().await?;
        if !admin.contains_topic(topic).await? {
            return Err(Error::TopicDoesNotExist(topic.to_string()));
        }

        let consumer = self.consumer.lock().await;
        let infos = consumer.partitions_for(topic, self.operation_timeout)?;
        let mut offsets = HashMap::with_capacity(infos.len());
        for info in infos {
            let tp = TopicPartition::new(topic, info.partition);
            let end = consumer.end_offset(&tp, self.operation_timeout)?;
            offsets.insert(info.partition, end);
        }
        Ok(offsets)
    }

    /// Latest offset of the partition, retried `retries` times on
    /// transient broker faults.
    pub async fn get_partition_latest_offset_and_retry(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        let guard = self.consumer.lock().await;
        let consumer = &*guard;
        let timeout = self.operation_timeout;
        retry::retry_fixed(
            retries,
            FETCH_RETRY_DELAY,
            "get_partition_latest_offset",
            Error::is_retryable,
            || async move { consumer.end_offset(tp, timeout) },
        )
        .await
    }

    /// Earliest offset of the partition, retried `retries` times on
    /// transient broker faults.
    pub async fn get_partition_earliest_offset_and_retry(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        let guard = self.consumer.lock().await;
        let consumer = &*guard;
        let timeout = self.operation_timeout;
        retry::retry_fixed(
            retries,
            FETCH_RETRY_DELAY,
            "get_partition_earliest_offset",
            Error::is_retryable,
            || async move { consumer.beginning_offset(tp, timeout) },
        )
        .await
    }

    /// Earliest offset whose record timestamp is at or after
    /// `timestamp_ms`; falls back to the end offset when the broker has no
    /// such record.
    pub async fn get_partition_offset_by_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
    ) -> Result<i64> {
        let consumer = self.consumer.lock().await;
        match consumer.offset_for_time(tp, timestamp_ms, self.operation_timeout)? {
            Some(offset) => Ok(offset),
            None => consumer.end_offset(tp, self.operation_timeout),
        }
    }

    /// Producer timestamp embedded in the last data record of the
    /// partition, skipping control records. Errors when the partition holds
    /// no records at all, or nothing but control records.
    pub async fn get_producer_timestamp_of_last_data_record(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        let guard = self.consumer.lock().await;
        let consumer = &*guard;
        retry::retry_fixed(
            retries,
            FETCH_RETRY_DELAY,
            "get_producer_timestamp_of_last_data_record",
            Error::is_retryable,
            || self.producer_timestamp_of_last_data_record(consumer, tp),
        )
        .await
    }

    async fn producer_timestamp_of_last_data_record(
        &self,
        consumer: &PartitionConsumer,
        tp: &TopicPartition,
    ) -> Result<i64> {
        let end = consumer.end_offset(tp, self.operation_timeout)?;
        let beginning = consumer.beginning_offset(tp, self.operation_timeout)?;
        if end <= beginning {
            return Err(Error::Broker(format!(
                "no records in topic-partition: {tp}, cannot determine last producer timestamp"
            )));
        }

        // Scan backward from the tail in doubling windows until a data
        // record shows up or the log head is reached.
        let mut window: i64 = 1;
        loop {
            let from = (end - window).max(beginning);
            let records = self.read_range(consumer, tp, from, end).await?;
            if let Some(timestamp) = records
                .iter()
                .rev()
                .find(|record| !record.control)
                .map(|record| record.producer_timestamp_ms)
            {
                return Ok(timestamp);
            }
            if from == beginning {
                return Err(Error::Broker(format!(
                    "only control records in topic-partition: {tp}, no producer timestamp available"
                )));
            }
            window *= 2;
        }
    }

    async fn read_range(
        &self,
        consumer: &PartitionConsumer,
        tp: &TopicPartition,
        from: i64,
        end: i64,
    ) -> Result<Vec<ConsumerRecord>> {
        consumer.subscribe(tp, from - 1)?;
        let deadline = Instant::now() + self.operation_timeout;
        let mut records: Vec<ConsumerRecord> = Vec::new();

        loop {
            let reached_end = records
                .last()
                .map_or(false, |record| record.offset + 1 >= end);
            if reached_end {
                break;
            }
            let batch = match consumer.poll(TAIL_SCAN_POLL_TIMEOUT).await {
                Ok(batch) => batch,
                Err(e) => {
                    let _ = consumer.unsubscribe(tp);
                    return Err(e);
                }
            };
            if batch.is_empty() && Instant::now() >= deadline {
                let _ = consumer.unsubscribe(tp);
                return Err(Error::timed_out(
                    format!("reading tail of topic-partition: {tp}"),
                    self.operation_timeout.as_millis() as u64,
                    None,
                ));
            }
            records.extend(
                batch
                    .into_iter()
                    .filter(|record| record.topic_partition == *tp && record.offset < end),
            );
        }

        consumer.unsubscribe(tp)?;
        Ok(records)
    }

    /// Partition metadata for the topic.
    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<PartitionInfo>> {
        let consumer = self.consumer.lock().await;
        consumer.partitions_for(topic, self.operation_timeout)
    }

    /// Replace the observation consumer with a fresh one, in case the old
    /// one is wedged on stale metadata.
    pub async fn recreate_consumer(&self) -> Result<()> {
        let mut guard = self.consumer.lock().await;
        let fresh = (self.consumer_builder)()?;
        guard.close();
        *guard = fresh;
        info!("Recreated offset fetcher consumer");
        Ok(())
    }

    /// Best-effort teardown.
    pub async fn close(&self) {
        let mut guard = self.consumer.lock().await;
        guard.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_pubsub::admin::{MemoryTopicAdmin, TopicAdmin};
    use stratus_pubsub::consumer::{MemoryConsumerHandle, MemoryRawConsumer};
    use stratus_pubsub::ConsumerConfig;
    use stratus_common::TopicProperties;

    fn fetcher_with_memory_clients() -> (PartitionOffsetFetcher, MemoryConsumerHandle, MemoryTopicAdmin)
    {
        let admin = MemoryTopicAdmin::new();
        let broker = admin.handle();
        let raw = MemoryRawConsumer::attached(broker);
        let handle = raw.handle();
        let consumer = PartitionConsumer::new(Box::new(raw), ConsumerConfig::default());
        let consumer = std::sync::Mutex::new(Some(consumer));

        let lazy = Arc::new(LazyAdmin::preset(
            "read-only",
            Arc::new(admin.clone()) as Arc<dyn TopicAdmin>,
        ));
        let builder: ConsumerBuilder = Arc::new(move || {
            consumer
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| Error::Configuration("consumer already built".into()))
        });
        let fetcher =
            PartitionOffsetFetcher::new(lazy, builder, Duration::from_secs(1)).unwrap();
        (fetcher, handle, admin)
    }

    #[tokio::test]
    async fn test_latest_offsets_for_missing_topic_is_empty() {
        let (fetcher, _records, _admin) = fetcher_with_memory_clients();
        assert!(fetcher.get_topic_latest_offsets("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn test_latest_offsets_per_partition() {
        let (fetcher, records, admin) = fetcher_with_memory_clients();
        admin
            .create_topic("orders", 2, 1, &TopicProperties::new())
            .await
            .unwrap();
        records.append(&TopicPartition::new("orders", 0), 0, 10);
        records.append(&TopicPartition::new("orders", 0), 1, 20);
        records.append(&TopicPartition::new("orders", 1), 0, 30);

        let offsets = fetcher.get_topic_latest_offsets("orders").await;
        assert_eq!(offsets.get(&0), Some(&2));
        assert_eq!(offsets.get(&1), Some(&1));
    }

    #[tokio::test]
    async fn test_offset_by_time_falls_back_to_end_offset() {
        let (fetcher, records, _admin) = fetcher_with_memory_clients();
        let tp = TopicPartition::new("orders", 0);
        records.append(&tp, 0, 100);
        records.append(&tp, 1, 200);

        assert_eq!(fetcher.get_partition_offset_by_time(&tp, 150).await.unwrap(), 1);
        assert_eq!(fetcher.get_partition_offset_by_time(&tp, 999).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_producer_timestamp_skips_control_records() {
        let (fetcher, records, _admin) = fetcher_with_memory_clients();
        let tp = TopicPartition::new("orders", 0);
        records.append(&tp, 0, 100);
        records.append(&tp, 1, 200);
        records.append_control(&tp, 2, 300);

        let timestamp = fetcher
            .get_producer_timestamp_of_last_data_record(&tp, 1)
            .await
            .unwrap();
        assert_eq!(timestamp, 200);
    }

    #[tokio::test]
    async fn test_producer_timestamp_of_empty_partition_errors() {
        let (fetcher, _records, _admin) = fetcher_with_memory_clients();
        let tp = TopicPartition::new("orders", 0);
        assert!(fetcher
            .get_producer_timestamp_of_last_data_record(&tp, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_producer_timestamp_of_all_control_partition_errors() {
        let (fetcher, records, _admin) = fetcher_with_memory_clients();
        let tp = TopicPartition::new("orders", 0);
        records.append_control(&tp, 0, 100);
        records.append_control(&tp, 1, 200);

        assert!(fetcher
            .get_producer_timestamp_of_last_data_record(&tp, 1)
            .await
            .is_err());
    }
}

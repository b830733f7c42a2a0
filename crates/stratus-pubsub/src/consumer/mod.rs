//! Byte-level consumer wrappers.
//!
//! [`RawConsumer`] mirrors the broker client's consumer surface and is
//! **not thread-safe**: callers must serialize access externally (the
//! partition offset fetcher does so with its own mutex).

pub mod kafka;
pub mod memory;
pub mod offsets_tracker;
pub mod partition_consumer;

use std::time::Duration;

use stratus_common::{PartitionInfo, Result, TopicPartition};

pub use kafka::KafkaRawConsumer;
pub use memory::{MemoryConsumerHandle, MemoryRawConsumer};
pub use offsets_tracker::PartitionOffsetsTracker;
pub use partition_consumer::PartitionConsumer;

/// One fetched record.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic_partition: TopicPartition,
    pub offset: i64,
    /// Timestamp embedded by the producer, in milliseconds; `-1` when the
    /// broker did not report one.
    pub producer_timestamp_ms: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Non-data record carrying stream metadata. Broker clients normally
    /// filter these out before delivery; sources that surface them must set
    /// the flag.
    pub control: bool,
}

/// Low-level consumer operations over raw bytes.
///
/// Implementations are single-threaded by contract; none of these methods
/// may be called concurrently.
pub trait RawConsumer: Send {
    /// Replace the current partition assignment.
    fn assign(&self, partitions: &[TopicPartition]) -> Result<()>;

    fn assignment(&self) -> Result<Vec<TopicPartition>>;

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<()>;

    fn seek_to_beginning(&self, partitions: &[TopicPartition]) -> Result<()>;

    fn pause(&self, partitions: &[TopicPartition]) -> Result<()>;

    fn resume(&self, partitions: &[TopicPartition]) -> Result<()>;

    /// Fetch one batch, blocking up to `timeout`.
    fn poll(&self, timeout: Duration) -> Result<Vec<ConsumerRecord>>;

    /// Earliest available offset for the partition.
    fn beginning_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64>;

    /// One past the last appended offset (the high watermark).
    fn end_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64>;

    /// Earliest offset whose record timestamp is at or after `timestamp_ms`,
    /// or `None` when no such record exists.
    fn offset_for_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
        timeout: Duration,
    ) -> Result<Option<i64>>;

    fn partitions_for(&self, topic: &str, timeout: Duration) -> Result<Vec<PartitionInfo>>;

    /// Best-effort teardown; never fails.
    fn close(&mut self);
}

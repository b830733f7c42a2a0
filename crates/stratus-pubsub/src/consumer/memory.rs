//! In-memory implementation of [`RawConsumer`] for testing.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use stratus_common::{Error, PartitionInfo, Result, TopicPartition};

use crate::admin::memory::MemoryBrokerHandle;

use super::{ConsumerRecord, RawConsumer};

#[derive(Default)]
struct ConsumerState {
    /// Log per partition, keyed by offset.
    logs: HashMap<TopicPartition, BTreeMap<i64, ConsumerRecord>>,
    partition_infos: HashMap<String, Vec<PartitionInfo>>,
    assignment: Vec<TopicPartition>,
    positions: HashMap<TopicPartition, i64>,
    paused: HashSet<TopicPartition>,
    poll_errors: VecDeque<Error>,
    closed: bool,
}

/// Shared handle for seeding records and scripting poll faults.
#[derive(Clone)]
pub struct MemoryConsumerHandle {
    state: Arc<RwLock<ConsumerState>>,
}

impl MemoryConsumerHandle {
    pub fn append_record(&self, record: ConsumerRecord) {
        let mut state = self.state.write();
        state
            .logs
            .entry(record.topic_partition.clone())
            .or_default()
            .insert(record.offset, record);
    }

    /// Append a data record with the given offset and producer timestamp.
    pub fn append(&self, tp: &TopicPartition, offset: i64, producer_timestamp_ms: i64) {
        self.append_record(ConsumerRecord {
            topic_partition: tp.clone(),
            offset,
            producer_timestamp_ms,
            key: None,
            value: Some(vec![0u8]),
            control: false,
        });
    }

    /// Append a control record (skipped by data-record scans).
    pub fn append_control(&self, tp: &TopicPartition, offset: i64, producer_timestamp_ms: i64) {
        self.append_record(ConsumerRecord {
            topic_partition: tp.clone(),
            offset,
            producer_timestamp_ms,
            key: None,
            value: None,
            control: true,
        });
    }

    pub fn set_partition_infos(&self, topic: &str, infos: Vec<PartitionInfo>) {
        self.state
            .write()
            .partition_infos
            .insert(topic.to_string(), infos);
    }

    pub fn push_poll_error(&self, error: Error) {
        self.state.write().poll_errors.push_back(error);
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

/// In-memory raw consumer.
///
/// Optionally attached to a [`MemoryBrokerHandle`] so partition metadata
/// tracks the admin's topic table; otherwise metadata comes from
/// [`MemoryConsumerHandle::set_partition_infos`].
pub struct MemoryRawConsumer {
    state: Arc<RwLock<ConsumerState>>,
    broker: Option<MemoryBrokerHandle>,
}

impl MemoryRawConsumer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConsumerState::default())),
            broker: None,
        }
    }

    /// Attach to a broker model so `partitions_for` follows the admin state.
    pub fn attached(broker: MemoryBrokerHandle) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConsumerState::default())),
            broker: Some(broker),
        }
    }

    pub fn handle(&self) -> MemoryConsumerHandle {
        MemoryConsumerHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MemoryRawConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl RawConsumer for MemoryRawConsumer {
    fn assign(&self, partitions: &[TopicPartition]) -> Result<()> {
        let mut state = self.state.write();
        state.assignment = partitions.to_vec();
        state.positions.retain(|tp, _| partitions.contains(tp));
        Ok(())
    }

    fn assignment(&self) -> Result<Vec<TopicPartition>> {
        Ok(self.state.read().assignment.clone())
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<()> {
        self.state.write().positions.insert(tp.clone(), offset);
        Ok(())
    }

    fn seek_to_beginning(&self, partitions: &[TopicPartition]) -> Result<()> {
        let mut state = self.state.write();
        for tp in partitions {
            let beginning = state
                .logs
                .get(tp)
                .and_then(|log| log.keys().next().copied())
                .unwrap_or(0);
            state.positions.insert(tp.clone(), beginning);
        }
        Ok(())
    }

    fn pause(&self, partitions: &[TopicPartition]) -> Result<()> {
        let mut state = self.state.write();
        for tp in partitions {
            state.paused.insert(tp.clone());
        }
        Ok(())
    }

    fn resume(&self, partitions: &[TopicPartition]) -> Result<()> {
        let mut state = self.state.write();
        for tp in partitions {
            state.paused.remove(tp);
        }
        Ok(())
    }

    fn poll(&self, _timeout: Duration) -> Result<Vec<ConsumerRecord>> {
        let mut state = self.state.write();
        if let Some(error) = state.poll_errors.pop_front() {
            return Err(error);
        }

        let mut batch = Vec::new();
        let assignment = state.assignment.clone();
        for tp in assignment {
            if state.paused.contains(&tp) {
                continue;
            }
            let position = state.positions.get(&tp).copied().unwrap_or(0);
            let records: Vec<ConsumerRecord> = state
                .logs
                .get(&tp)
                .map(|log| log.range(position..).map(|(_, r)| r.clone()).collect())
                .unwrap_or_default();
            if let Some(last) = records.last() {
                state.positions.insert(tp.clone(), last.offset + 1);
            }
            batch.extend(records);
        }
        Ok(batch)
    }

    fn beginning_offset(&self, tp: &TopicPartition, _timeout: Duration) -> Result<i64> {
        Ok(self
            .state
            .read()
            .logs
            .get(tp)
            .and_then(|log| log.keys().next().copied())
            .unwrap_or(0))
    }

    fn end_offset(&self, tp: &TopicPartition, _timeout: Duration) -> Result<i64> {
        Ok(self
            .state
            .read()
            .logs
            .get(tp)
            .and_then(|log| log.keys().next_back().map(|o| o + 1))
            .unwrap_or(0))
    }

    fn offset_for_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
        _timeout: Duration,
    ) -> Result<Option<i64>> {
        Ok(self.state.read().logs.get(tp).and_then(|log| {
            log.values()
                .find(|r| r.producer_timestamp_ms >= timestamp_ms)
                .map(|r| r.offset)
        }))
    }

    fn partitions_for(&self, topic: &str, _timeout: Duration) -> Result<Vec<PartitionInfo>> {
        if let Some(broker) = &self.broker {
            return broker
                .partition_infos(topic)
                .ok_or_else(|| Error::TopicDoesNotExist(topic.to_string()));
        }
        self.state
            .read()
            .partition_infos
            .get(topic)
            .cloned()
            .ok_or_else(|| Error::TopicDoesNotExist(topic.to_string()))
    }

    fn close(&mut self) {
        debug!("Closing in-memory raw consumer");
        self.state.write().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_advances_position() {
        let consumer = MemoryRawConsumer::new();
        let handle = consumer.handle();
        let tp = TopicPartition::new("t", 0);
        handle.append(&tp, 0, 100);
        handle.append(&tp, 1, 200);

        consumer.assign(std::slice::from_ref(&tp)).unwrap();
        consumer.seek_to_beginning(std::slice::from_ref(&tp)).unwrap();

        let batch = consumer.poll(Duration::from_millis(10)).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(consumer.poll(Duration::from_millis(10)).unwrap().is_empty());

        handle.append(&tp, 2, 300);
        let batch = consumer.poll(Duration::from_millis(10)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].offset, 2);
    }

    #[test]
    fn test_paused_partition_yields_nothing() {
        let consumer = MemoryRawConsumer::new();
        let handle = consumer.handle();
        let tp = TopicPartition::new("t", 0);
        handle.append(&tp, 0, 100);

        consumer.assign(std::slice::from_ref(&tp)).unwrap();
        consumer.pause(std::slice::from_ref(&tp)).unwrap();
        assert!(consumer.poll(Duration::from_millis(10)).unwrap().is_empty());

        consumer.resume(std::slice::from_ref(&tp)).unwrap();
        assert_eq!(consumer.poll(Duration::from_millis(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_offset_for_time() {
        let consumer = MemoryRawConsumer::new();
        let handle = consumer.handle();
        let tp = TopicPartition::new("t", 0);
        handle.append(&tp, 0, 100);
        handle.append(&tp, 1, 200);
        handle.append(&tp, 2, 300);

        assert_eq!(
            consumer
                .offset_for_time(&tp, 150, Duration::from_millis(10))
                .unwrap(),
            Some(1)
        );
        assert_eq!(
            consumer
                .offset_for_time(&tp, 301, Duration::from_millis(10))
                .unwrap(),
            None
        );
    }
}

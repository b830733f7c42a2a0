//! Tracks consumed and end offsets per partition to answer lag queries.

use dashmap::DashMap;

use stratus_common::TopicPartition;

use super::ConsumerRecord;

/// Offset returned for partitions without tracked state.
const UNTRACKED: i64 = -1;

/// Per-partition offset bookkeeping, fed from poll batches and recorded
/// end-offset observations.
#[derive(Default)]
pub struct PartitionOffsetsTracker {
    /// Highest offset consumed so far, per partition.
    consumed: DashMap<TopicPartition, i64>,
    /// Latest end offset reported by the broker, per partition.
    end: DashMap<TopicPartition, i64>,
}

impl PartitionOffsetsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the offsets seen in one poll batch.
    pub fn observe_records(&self, records: &[ConsumerRecord]) {
        for record in records {
            self.consumed
                .entry(record.topic_partition.clone())
                .and_modify(|o| *o = (*o).max(record.offset))
                .or_insert(record.offset);
        }
    }

    /// Record a broker-reported end offset.
    pub fn observe_end_offset(&self, tp: &TopicPartition, end_offset: i64) {
        self.end.insert(tp.clone(), end_offset);
    }

    /// Consumed-to-end lag, or `-1` when either side is untracked.
    pub fn offset_lag(&self, tp: &TopicPartition) -> i64 {
        let consumed = match self.consumed.get(tp) {
            Some(o) => *o,
            None => return UNTRACKED,
        };
        let end = match self.end.get(tp) {
            Some(o) => *o,
            None => return UNTRACKED,
        };
        // end is one past the last appended record
        (end - 1 - consumed).max(0)
    }

    /// Latest broker end offset, or `-1` when untracked.
    pub fn latest_offset(&self, tp: &TopicPartition) -> i64 {
        self.end.get(tp).map(|o| *o).unwrap_or(UNTRACKED)
    }

    pub fn forget(&self, tp: &TopicPartition) {
        self.consumed.remove(tp);
        self.end.remove(tp);
    }

    pub fn clear(&self) {
        self.consumed.clear();
        self.end.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tp: &TopicPartition, offset: i64) -> ConsumerRecord {
        ConsumerRecord {
            topic_partition: tp.clone(),
            offset,
            producer_timestamp_ms: 0,
            key: None,
            value: None,
            control: false,
        }
    }

    #[test]
    fn test_untracked_returns_minus_one() {
        let tracker = PartitionOffsetsTracker::new();
        let tp = TopicPartition::new("t", 0);
        assert_eq!(tracker.offset_lag(&tp), -1);
        assert_eq!(tracker.latest_offset(&tp), -1);
    }

    #[test]
    fn test_lag_from_batch_and_end_offset() {
        let tracker = PartitionOffsetsTracker::new();
        let tp = TopicPartition::new("t", 0);

        tracker.observe_records(&[record(&tp, 4), record(&tp, 7)]);
        tracker.observe_end_offset(&tp, 10);

        // consumed up to 7, log ends at 9
        assert_eq!(tracker.offset_lag(&tp), 2);
        assert_eq!(tracker.latest_offset(&tp), 10);

        tracker.forget(&tp);
        assert_eq!(tracker.offset_lag(&tp), -1);
    }
}

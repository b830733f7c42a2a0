//! Subscription engine over a raw consumer: per-partition assignment,
//! seeking, pause/resume and bounded-retry polling.
//!
//! Not thread-safe. The partition offset fetcher serializes access with its
//! own mutex; any other owner must do the same.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use stratus_common::{Error, PartitionInfo, Result, TopicPartition, LOWEST_OFFSET};
use stratus_monitoring::ConsumerMetrics;

use crate::config::ConsumerConfig;

use super::{ConsumerRecord, PartitionOffsetsTracker, RawConsumer};

pub struct PartitionConsumer {
    inner: Box<dyn RawConsumer>,
    config: ConsumerConfig,
    /// Cooperative interrupt: raised by `close()` or an external holder of
    /// [`Self::interrupt_handle`]; aborts in-flight retry cycles.
    shutdown: Arc<AtomicBool>,
    tracker: Option<PartitionOffsetsTracker>,
    metrics: Option<ConsumerMetrics>,
}

impl PartitionConsumer {
    pub fn new(inner: Box<dyn RawConsumer>, config: ConsumerConfig) -> Self {
        Self {
            inner,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            tracker: None,
            metrics: None,
        }
    }

    /// Enable the per-partition offsets tracker fed from poll batches and
    /// end-offset observations.
    pub fn with_offsets_tracking(inner: Box<dyn RawConsumer>, config: ConsumerConfig) -> Self {
        let mut consumer = Self::new(inner, config);
        consumer.tracker = Some(PartitionOffsetsTracker::new());
        consumer
    }

    /// Record poll outcomes and retries against the given metrics handle.
    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag that aborts retry cycles when raised; the Rust analog of
    /// interrupting the polling thread.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Add the partition to the assignment and position it: after
    /// `last_read_offset` when one is known, else at the earliest available
    /// offset. Warns and skips when already assigned.
    pub fn subscribe(&self, tp: &TopicPartition, last_read_offset: i64) -> Result<()> {
        let mut assignment = self.inner.assignment()?;
        if assignment.contains(tp) {
            warn!(%tp, "Already subscribed, ignoring subscription request");
            return Ok(());
        }
        assignment.push(tp.clone());
        self.inner.assign(&assignment)?;

        if last_read_offset > LOWEST_OFFSET {
            self.inner.seek(tp, last_read_offset + 1)?;
        } else {
            self.inner.seek_to_beginning(std::slice::from_ref(tp))?;
        }
        info!(%tp, last_read_offset, "Subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, tp: &TopicPartition) -> Result<()> {
        let mut assignment = self.inner.assignment()?;
        if let Some(index) = assignment.iter().position(|assigned| assigned == tp) {
            assignment.remove(index);
            self.inner.assign(&assignment)?;
        }
        if let Some(tracker) = &self.tracker {
            tracker.forget(tp);
        }
        Ok(())
    }

    /// Remove all given partitions with a single assignment update.
    pub fn batch_unsubscribe(&self, partitions: &HashSet<TopicPartition>) -> Result<()> {
        let assignment: Vec<TopicPartition> = self
            .inner
            .assignment()?
            .into_iter()
            .filter(|tp| !partitions.contains(tp))
            .collect();
        self.inner.assign(&assignment)?;
        if let Some(tracker) = &self.tracker {
            for tp in partitions {
                tracker.forget(tp);
            }
        }
        Ok(())
    }

    /// Rewind a subscribed partition to the earliest available offset.
    pub fn reset_offset(&self, tp: &TopicPartition) -> Result<()> {
        if !self.has_subscription(tp)? {
            return Err(Error::UnsubscribedTopicPartition(tp.clone()));
        }
        self.inner.seek_to_beginning(std::slice::from_ref(tp))
    }

    /// No-op when the partition is not subscribed.
    pub fn pause(&self, tp: &TopicPartition) -> Result<()> {
        if self.has_subscription(tp)? {
            self.inner.pause(std::slice::from_ref(tp))?;
        }
        Ok(())
    }

    /// No-op when the partition is not subscribed.
    pub fn resume(&self, tp: &TopicPartition) -> Result<()> {
        if self.has_subscription(tp)? {
            self.inner.resume(std::slice::from_ref(tp))?;
        }
        Ok(())
    }

    pub fn has_any_subscription(&self) -> Result<bool> {
        Ok(!self.inner.assignment()?.is_empty())
    }

    pub fn has_subscription(&self, tp: &TopicPartition) -> Result<bool> {
        Ok(self.inner.assignment()?.contains(tp))
    }

    pub fn get_assignment(&self) -> Result<Vec<TopicPartition>> {
        self.inner.assignment()
    }

    /// Fetch one batch, retrying classified-transient errors up to the
    /// configured attempt count. The final attempt surfaces the original
    /// error unchanged. Aborts with `Interrupted` (original cause attached)
    /// when the shutdown flag is raised before or during a backoff sleep.
    pub async fn poll(&self, timeout: Duration) -> Result<Vec<ConsumerRecord>> {
        let retry_times = self.config.poll_retry_times.max(1);
        let mut attempt = 1u32;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(Error::interrupted("consumer poll", None));
            }
            match self.inner.poll(timeout) {
                Ok(records) => {
                    if let Some(tracker) = &self.tracker {
                        tracker.observe_records(&records);
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_poll(true);
                    }
                    return Ok(records);
                }
                Err(error) if error.is_retryable() && attempt < retry_times => {
                    warn!(
                        attempt,
                        retry_times,
                        error = %error,
                        "Transient error while polling, will retry"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_poll_retry();
                    }
                    attempt += 1;
                    let backoff = self.config.poll_retry_backoff();
                    if !backoff.is_zero() {
                        sleep(backoff).await;
                    }
                    if self.shutdown.load(Ordering::Acquire) {
                        return Err(Error::interrupted("consumer poll backoff", Some(error)));
                    }
                }
                Err(error) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_poll(false);
                    }
                    return Err(error);
                }
            }
        }
    }

    pub fn beginning_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64> {
        self.inner.beginning_offset(tp, timeout)
    }

    pub fn end_offset(&self, tp: &TopicPartition, timeout: Duration) -> Result<i64> {
        let end = self.inner.end_offset(tp, timeout)?;
        if let Some(tracker) = &self.tracker {
            tracker.observe_end_offset(tp, end);
        }
        Ok(end)
    }

    pub fn offset_for_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
        timeout: Duration,
    ) -> Result<Option<i64>> {
        self.inner.offset_for_time(tp, timestamp_ms, timeout)
    }

    pub fn partitions_for(&self, topic: &str, timeout: Duration) -> Result<Vec<PartitionInfo>> {
        self.inner.partitions_for(topic, timeout)
    }

    /// Consumed-to-end lag, `-1` when tracking is off or the partition is
    /// untracked.
    pub fn offset_lag(&self, tp: &TopicPartition) -> i64 {
        self.tracker
            .as_ref()
            .map(|tracker| tracker.offset_lag(tp))
            .unwrap_or(-1)
    }

    /// Latest broker-reported end offset, `-1` when untracked.
    pub fn latest_offset(&self, tp: &TopicPartition) -> i64 {
        self.tracker
            .as_ref()
            .map(|tracker| tracker.latest_offset(tp))
            .unwrap_or(-1)
    }

    /// Best-effort teardown: raises the interrupt flag and closes the
    /// underlying consumer.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(tracker) = &self.tracker {
            tracker.clear();
        }
        self.inner.close();
    }
}

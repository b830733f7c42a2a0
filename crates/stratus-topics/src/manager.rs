//! Topic manager: the public face of topic lifecycle management.
//!
//! One instance is bound to one bootstrap endpoint and composes the
//! write-only admin (mutations), the read-only admin (metadata), the
//! partition offset fetcher and the advisory config cache.
//!
//! Concurrency contract: compaction policy updates, topic listing, the
//! readiness predicate and close are mutually exclusive per instance.
//! [`TopicManager::ensure_topic_is_deleted_and_block`] is deliberately not
//! guarded by the instance lock: a slow delete (up to the operation
//! timeout) must not freeze unrelated metadata queries. Serializing
//! deletions is the caller's job, with the deletion-underway check as a
//! defensive backstop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, trace, warn};

use stratus_common::{
    retry, CleanupPolicy, Error, PartitionInfo, Result, TopicPartition, TopicProperties,
};
use stratus_pubsub::{ClientFactory, TopicAdmin, UNKNOWN_TOPIC_RETENTION};

use crate::config::TopicManagerConfig;
use crate::config_cache::TopicConfigCache;
use crate::lazy::LazyAdmin;
use crate::offset_fetcher::{ConsumerBuilder, PartitionOffsetFetcher};

const MS_PER_SECOND: i64 = 1000;
const MS_PER_HOUR: i64 = 60 * 60 * MS_PER_SECOND;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Retention applied to eternal topics.
pub const ETERNAL_TOPIC_RETENTION_POLICY_MS: i64 = i64::MAX;

/// Retention applied when the caller does not supply one.
pub const DEFAULT_TOPIC_RETENTION_POLICY_MS: i64 = 5 * MS_PER_DAY;

/// Safety margin added on top of rewind and bootstrap times when deriving
/// retention for hybrid stores.
pub const BUFFER_REPLAY_MINIMAL_SAFETY_MARGIN: i64 = 2 * MS_PER_DAY;

pub const DEFAULT_REPLICATION_FACTOR: i32 = 3;

pub const MAX_TOPIC_DELETE_RETRIES: u32 = 3;

/// Floor on legacy delete-poll iterations, guarding against bad config.
const MINIMUM_TOPIC_DELETION_STATUS_POLL_TIMES: u64 = 10;

const MAX_CONSUMER_RECREATION_INTERVAL: u64 = 100;

/// Sleep between readiness checks while waiting for a topic to come online.
const TOPIC_CREATION_POLL_INTERVAL: Duration = Duration::from_millis(200);

const CREATE_TOPIC_RETRY_ATTEMPTS: u32 = 10;
const CREATE_TOPIC_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const CREATE_TOPIC_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Settings for topic creation beyond the partition/replication counts.
#[derive(Debug, Clone)]
pub struct TopicCreateSettings {
    /// Effectively infinite retention; ignored when `retention_ms` is set.
    pub eternal: bool,
    /// Explicit retention; `None` derives it from `eternal`.
    pub retention_ms: Option<i64>,
    pub log_compaction: bool,
    /// Applied only when supplied; cluster defaults otherwise.
    pub min_in_sync_replicas: Option<i32>,
    /// Use the short operation deadline so creation is close to
    /// non-blocking.
    pub use_fast_operation_timeout: bool,
}

impl Default for TopicCreateSettings {
    fn default() -> Self {
        Self {
            eternal: false,
            retention_ms: None,
            log_compaction: false,
            min_in_sync_replicas: None,
            use_fast_operation_timeout: false,
        }
    }
}

impl TopicCreateSettings {
    pub fn eternal() -> Self {
        Self {
            eternal: true,
            ..Default::default()
        }
    }

    pub fn with_retention(retention_ms: i64) -> Self {
        Self {
            retention_ms: Some(retention_ms),
            ..Default::default()
        }
    }

    fn effective_retention_ms(&self) -> i64 {
        self.retention_ms.unwrap_or(if self.eternal {
            ETERNAL_TOPIC_RETENTION_POLICY_MS
        } else {
            DEFAULT_TOPIC_RETENTION_POLICY_MS
        })
    }
}

pub struct TopicManager {
    config: TopicManagerConfig,
    bootstrap_servers: String,
    write_admin: Arc<LazyAdmin>,
    read_admin: Arc<LazyAdmin>,
    offset_fetcher: PartitionOffsetFetcher,
    config_cache: TopicConfigCache,
    instance_lock: Mutex<()>,
}

impl TopicManager {
    /// Build a manager over clients from `factory`. Admin clients are
    /// constructed lazily on first use; the offset fetcher's consumer is
    /// built eagerly.
    pub fn new(factory: Arc<ClientFactory>, config: TopicManagerConfig) -> Result<Self> {
        let bootstrap_servers = factory.bootstrap_servers().to_string();

        let read_factory = factory.clone();
        let read_admin = Arc::new(LazyAdmin::new(
            "read-only",
            Box::new(move || read_factory.create_read_only_admin()),
        ));
        let write_factory = factory.clone();
        let write_admin = Arc::new(LazyAdmin::new(
            "write-only",
            Box::new(move || write_factory.create_write_only_admin()),
        ));

        let consumer_factory = factory.clone();
        let consumer_builder: ConsumerBuilder =
            Arc::new(move || consumer_factory.create_partition_consumer());

        Self::assemble(
            config,
            bootstrap_servers,
            write_admin,
            read_admin,
            consumer_builder,
        )
    }

    /// Build a manager over pre-constructed clients. Intended for tests and
    /// embedding scenarios where the factory indirection is unwanted.
    pub fn with_clients(
        write_admin: Arc<dyn TopicAdmin>,
        read_admin: Arc<dyn TopicAdmin>,
        consumer_builder: ConsumerBuilder,
        config: TopicManagerConfig,
    ) -> Result<Self> {
        Self::assemble(
            config,
            String::new(),
            Arc::new(LazyAdmin::preset("write-only", write_admin)),
            Arc::new(LazyAdmin::preset("read-only", read_admin)),
            consumer_builder,
        )
    }

    fn assemble(
        config: TopicManagerConfig,
        bootstrap_servers: String,
        write_admin: Arc<LazyAdmin>,
        read_admin: Arc<LazyAdmin>,
        consumer_builder: ConsumerBuilder,
    ) -> Result<Self> {
        let offset_fetcher = PartitionOffsetFetcher::new(
            Arc::clone(&read_admin),
            consumer_builder,
            config.operation_timeout(),
        )?;
        let config_cache = TopicConfigCache::new(
            config.topic_config_cache_max_capacity,
            config.topic_config_cache_ttl(),
        );
        Ok(Self {
            config,
            bootstrap_servers,
            write_admin,
            read_admin,
            offset_fetcher,
            config_cache,
            instance_lock: Mutex::new(()),
        })
    }

    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }

    // ---------------------------------------------------------------------
    // Create
    // ---------------------------------------------------------------------

    /// Create a topic and block until it is observed online, with default
    /// settings apart from the eternal flag.
    pub async fn create_topic(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        eternal: bool,
    ) -> Result<()> {
        let settings = TopicCreateSettings {
            eternal,
            ..Default::default()
        };
        self.create_topic_with_settings(topic, partitions, replication, &settings)
            .await
    }

    /// Create a topic and block until it exists with every partition
    /// reporting at least one in-sync replica.
    ///
    /// A creation race is absorbed: when the broker answers "topic already
    /// exists", the topic is awaited as usual and its retention is updated
    /// to the requested value instead of failing.
    pub async fn create_topic_with_settings(
        &self,
        topic: &str,
        partitions: i32,
        replication: i32,
        settings: &TopicCreateSettings,
    ) -> Result<()> {
        let start = Instant::now();
        let cycle_timeout = if settings.use_fast_operation_timeout {
            self.config.fast_operation_timeout()
        } else {
            self.config.operation_timeout()
        };
        let deadline = start + cycle_timeout;
        let retention_ms = settings.effective_retention_ms();

        info!(topic, partitions, replication, "Creating topic");
        let mut props = TopicProperties::new();
        props.set_retention_ms(retention_ms);
        if settings.log_compaction {
            props.set_cleanup_policy(CleanupPolicy::Compact);
            props.set_min_compaction_lag_ms(self.config.min_log_compaction_lag_ms as i64);
        } else {
            props.set_cleanup_policy(CleanupPolicy::Delete);
        }
        if let Some(min_isr) = settings.min_in_sync_replicas {
            props.set_min_insync_replicas(min_isr);
        }
        // In case the cluster is not configured as expected.
        props.set_log_append_timestamp_type();

        let write_admin = self.write_admin.get().await?;
        let retry_config = retry::RetryConfig {
            max_attempts: CREATE_TOPIC_RETRY_ATTEMPTS,
            initial_delay: CREATE_TOPIC_INITIAL_BACKOFF,
            max_delay: CREATE_TOPIC_MAX_BACKOFF,
            timeout: cycle_timeout,
            ..Default::default()
        };
        let created = retry::retry_async(
            retry_config,
            "create_topic",
            Error::is_retryable,
            || write_admin.create_topic(topic, partitions, replication, &props),
        )
        .await;

        if let Err(e) = created {
            if e.is_caused_by_topic_exists() {
                info!(topic, "Topic already exists, will update retention policy");
                self.wait_until_topic_created(topic, Some(partitions), deadline)
                    .await?;
                self.update_topic_retention(topic, retention_ms).await?;
                info!(topic, retention_ms, "Updated retention policy of pre-existing topic");
                return Ok(());
            }
            return Err(Error::timed_out(
                format!("create topic: {topic}"),
                start.elapsed().as_millis() as u64,
                Some(e),
            ));
        }

        self.wait_until_topic_created(topic, Some(partitions), deadline)
            .await?;
        info!(
            topic,
            eternal = retention_ms == ETERNAL_TOPIC_RETENTION_POLICY_MS,
            "Successfully created topic"
        );
        Ok(())
    }

    async fn wait_until_topic_created(
        &self,
        topic: &str,
        expected_partition_count: Option<i32>,
        deadline: Instant,
    ) -> Result<()> {
        let start = Instant::now();
        while !self
            .contains_topic_and_all_partitions_are_online(topic, expected_partition_count)
            .await?
        {
            if Instant::now() > deadline {
                return Err(Error::timed_out(
                    format!("waiting for topic: {topic} to pass creation checks"),
                    start.elapsed().as_millis() as u64,
                    None,
                ));
            }
            sleep(TOPIC_CREATION_POLL_INTERVAL).await;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Config reads and updates
    // ---------------------------------------------------------------------

    /// Fetch the topic config from the broker, populating the cache.
    pub async fn get_topic_config(&self, topic: &str) -> Result<TopicProperties> {
        let props = self.read_admin.get().await?.get_topic_config(topic).await?;
        self.config_cache.insert(topic, props.clone());
        Ok(props)
    }

    /// Fetch the topic config, retrying transient faults, populating the
    /// cache.
    pub async fn get_topic_config_with_retry(&self, topic: &str) -> Result<TopicProperties> {
        let props = self
            .read_admin
            .get()
            .await?
            .get_topic_config_with_retry(topic)
            .await?;
        self.config_cache.insert(topic, props.clone());
        Ok(props)
    }

    /// Cached config, fetched on miss or expiry.
    pub async fn get_cached_topic_config(&self, topic: &str) -> Result<TopicProperties> {
        match self.config_cache.get(topic) {
            Some(props) => Ok(props),
            None => self.get_topic_config_with_retry(topic).await,
        }
    }

    /// Batch config fetch; every returned config populates the cache.
    pub async fn get_some_topic_configs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<String, TopicProperties>> {
        let configs = self
            .read_admin
            .get()
            .await?
            .get_some_topic_configs(topics)
            .await?;
        for (topic, props) in &configs {
            self.config_cache.insert(topic, props.clone());
        }
        Ok(configs)
    }

    /// Update the topic retention if it differs from `retention_ms`.
    /// Returns whether a broker mutation was issued. Idempotent.
    pub async fn update_topic_retention(&self, topic: &str, retention_ms: i64) -> Result<bool> {
        let props = self.get_topic_config(topic).await?;
        self.update_topic_retention_with_properties(topic, retention_ms, props)
            .await
    }

    /// Like [`Self::update_topic_retention`] but compares against
    /// already-fetched properties, saving a config round trip.
    pub async fn update_topic_retention_with_properties(
        &self,
        topic: &str,
        retention_ms: i64,
        mut props: TopicProperties,
    ) -> Result<bool> {
        if props.retention_ms() != Some(retention_ms) {
            props.set_retention_ms(retention_ms);
            self.write_admin
                .get()
                .await?
                .set_topic_config(topic, &props)
                .await?;
            self.config_cache.insert(topic, props);
            info!(
                topic,
                retention_ms,
                bootstrap = %self.bootstrap_servers,
                "Updated topic retention"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Align the cleanup policy and compaction lag with `log_compaction`,
    /// touching the broker only when something differs. Mutually exclusive
    /// with the other instance-locked operations.
    pub async fn update_topic_compaction_policy(
        &self,
        topic: &str,
        log_compaction: bool,
    ) -> Result<()> {
        let _guard = self.instance_lock.lock().await;

        let mut props = self.get_topic_config(topic).await?;
        let current_policy = props.cleanup_policy();
        let expected_policy = if log_compaction {
            CleanupPolicy::Compact
        } else {
            CleanupPolicy::Delete
        };
        let current_lag_ms = props.min_compaction_lag_ms();
        let expected_lag_ms = if log_compaction {
            self.config.min_log_compaction_lag_ms as i64
        } else {
            0
        };

        let mut needs_update = false;
        if current_policy != expected_policy {
            props.set_cleanup_policy(expected_policy);
            needs_update = true;
        }
        if current_lag_ms != expected_lag_ms {
            props.set_min_compaction_lag_ms(expected_lag_ms);
            needs_update = true;
        }

        if needs_update {
            self.write_admin
                .get()
                .await?
                .set_topic_config(topic, &props)
                .await?;
            self.config_cache.insert(topic, props);
            info!(
                topic,
                %current_policy,
                %expected_policy,
                current_lag_ms,
                expected_lag_ms,
                "Updated topic compaction policy"
            );
        }
        Ok(())
    }

    pub async fn is_topic_compaction_enabled(&self, topic: &str) -> Result<bool> {
        let props = self.get_cached_topic_config(topic).await?;
        Ok(props.cleanup_policy() == CleanupPolicy::Compact)
    }

    pub async fn get_topic_min_log_compaction_lag_ms(&self, topic: &str) -> Result<i64> {
        let props = self.get_cached_topic_config(topic).await?;
        Ok(props.min_compaction_lag_ms())
    }

    // ---------------------------------------------------------------------
    // Retention queries
    // ---------------------------------------------------------------------

    pub async fn get_all_topic_retentions(&self) -> Result<HashMap<String, i64>> {
        self.read_admin.get().await?.get_all_topic_retentions().await
    }

    /// Topic retention in milliseconds, or [`UNKNOWN_TOPIC_RETENTION`] when
    /// the broker reports none.
    pub async fn get_topic_retention(&self, topic: &str) -> Result<i64> {
        let props = self.get_topic_config(topic).await?;
        Ok(Self::retention_of(&props))
    }

    pub fn retention_of(props: &TopicProperties) -> i64 {
        props.retention_ms().unwrap_or(UNKNOWN_TOPIC_RETENTION)
    }

    /// A topic is truncated when it is gone, or its retention is a known
    /// value at or below the threshold. Unknown retention reads as "not
    /// truncated".
    pub async fn is_topic_truncated(
        &self,
        topic: &str,
        truncated_topic_max_retention_ms: i64,
    ) -> Result<bool> {
        match self.get_topic_retention(topic).await {
            Ok(retention) => Ok(Self::is_retention_below_truncated_threshold(
                retention,
                truncated_topic_max_retention_ms,
            )),
            Err(Error::TopicDoesNotExist(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub fn is_retention_below_truncated_threshold(
        retention_ms: i64,
        truncated_topic_max_retention_ms: i64,
    ) -> bool {
        retention_ms != UNKNOWN_TOPIC_RETENTION && retention_ms <= truncated_topic_max_retention_ms
    }

    /// Retention for a hybrid store's real-time topic: enough to cover the
    /// rewind window plus the bootstrap-to-online window plus a safety
    /// margin, never below the default policy.
    pub fn get_expected_retention_time_ms(
        rewind_time_seconds: i64,
        bootstrap_to_online_timeout_hours: i64,
    ) -> i64 {
        let rewind_ms = rewind_time_seconds * MS_PER_SECOND;
        let bootstrap_ms = bootstrap_to_online_timeout_hours * MS_PER_HOUR;
        (rewind_ms + bootstrap_ms + BUFFER_REPLAY_MINIMAL_SAFETY_MARGIN)
            .max(DEFAULT_TOPIC_RETENTION_POLICY_MS)
    }

    // ---------------------------------------------------------------------
    // Existence and readiness
    // ---------------------------------------------------------------------

    /// A quick existence check against the broker.
    pub async fn contains_topic(&self, topic: &str) -> Result<bool> {
        self.read_admin.get().await?.contains_topic(topic).await
    }

    /// Poll existence until it matches `expected`, with defaults for the
    /// backoff bounds and the operation timeout as overall duration.
    pub async fn contains_topic_with_expectation_and_retry(
        &self,
        topic: &str,
        max_attempts: u32,
        expected: bool,
    ) -> Result<bool> {
        self.contains_topic_with_expectation_and_retry_full(
            topic,
            max_attempts,
            expected,
            Duration::from_millis(100),
            Duration::from_secs(5),
            self.config.operation_timeout(),
        )
        .await
    }

    pub async fn contains_topic_with_expectation_and_retry_full(
        &self,
        topic: &str,
        max_attempts: u32,
        expected: bool,
        initial_backoff: Duration,
        max_backoff: Duration,
        max_duration: Duration,
    ) -> Result<bool> {
        Ok(self
            .read_admin
            .get()
            .await?
            .contains_topic_with_expectation_and_retry(
                topic,
                max_attempts,
                expected,
                initial_backoff,
                max_backoff,
                max_duration,
            )
            .await)
    }

    pub async fn list_topics(&self) -> Result<HashSet<String>> {
        let _guard = self.instance_lock.lock().await;
        self.read_admin.get().await?.list_all_topics().await
    }

    /// Readiness predicate: the topic exists, the partition count matches
    /// the expectation when one is supplied, and every partition reports at
    /// least one in-sync replica. This is an extensive check covering the
    /// window where a topic is not yet materialized on every broker.
    pub async fn contains_topic_and_all_partitions_are_online(
        &self,
        topic: &str,
        expected_partition_count: Option<i32>,
    ) -> Result<bool> {
        let _guard = self.instance_lock.lock().await;

        if !self.contains_topic(topic).await? {
            return Ok(false);
        }
        let infos: Vec<PartitionInfo> = match self.offset_fetcher.partitions_for(topic).await {
            Ok(infos) => infos,
            Err(e) => {
                warn!(topic, error = %e, "Partition info fetch failed, treating topic as not ready");
                return Ok(false);
            }
        };
        if infos.is_empty() {
            warn!(topic, "Partition info fetch returned nothing, treating topic as not ready");
            return Ok(false);
        }

        if let Some(expected) = expected_partition_count {
            if infos.len() as i32 != expected {
                error!(
                    topic,
                    expected,
                    actual = infos.len(),
                    "Unexpected partition count"
                );
                return Ok(false);
            }
        }

        let all_online = infos.iter().all(PartitionInfo::has_in_sync_replicas);
        if all_online {
            trace!(topic, "All partitions have at least one in-sync replica");
        } else {
            info!(topic, "Some partitions have no in-sync replica yet");
        }
        Ok(all_online)
    }

    // ---------------------------------------------------------------------
    // Delete
    // ---------------------------------------------------------------------

    async fn ensure_topic_is_deleted_async(
        &self,
        topic: &str,
    ) -> Result<Option<stratus_pubsub::DeleteTopicFuture>> {
        info!(topic, "Deleting topic");
        self.write_admin.get().await?.delete_topic(topic).await
    }

    /// Delete the topic and block until the broker confirms, adapting the
    /// asynchronous deletion protocol to a synchronous API.
    ///
    /// Deliberately not guarded by the instance lock; see the module docs.
    pub async fn ensure_topic_is_deleted_and_block(&self, topic: &str) -> Result<()> {
        if !self
            .contains_topic_and_all_partitions_are_online(topic, None)
            .await?
        {
            // Already gone, or never existed.
            return Ok(());
        }

        if !self.config.allow_concurrent_topic_deletion
            && self
                .read_admin
                .get()
                .await?
                .is_topic_deletion_underway()
                .await?
        {
            return Err(Error::DeletionUnderway);
        }

        match self.ensure_topic_is_deleted_async(topic).await? {
            Some(future) => {
                let timeout = self.config.operation_timeout();
                match tokio::time::timeout(timeout, future).await {
                    Ok(Ok(())) => {
                        info!(topic, "Topic has been deleted");
                        Ok(())
                    }
                    // The broker already got rid of it; that is a success.
                    Ok(Err(Error::TopicDoesNotExist(_))) => {
                        info!(topic, "Topic was already deleted");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::timed_out(
                        format!("delete topic: {topic}"),
                        timeout.as_millis() as u64,
                        None,
                    )),
                }
            }
            None => self.poll_until_topic_is_deleted(topic).await,
        }
    }

    /// Legacy deletion protocol: no confirmation future, so poll for
    /// disappearance, recreating the observation consumer on a doubling
    /// cadence in case it is wedged on stale metadata.
    async fn poll_until_topic_is_deleted(&self, topic: &str) -> Result<()> {
        let start = Instant::now();
        let poll_interval_ms = self.config.topic_deletion_status_poll_interval_ms;
        let max_times = if poll_interval_ms == 0 {
            self.config.operation_timeout_ms
        } else {
            self.config.operation_timeout_ms / poll_interval_ms
        }
        .max(MINIMUM_TOPIC_DELETION_STATUS_POLL_TIMES);

        let mut current: u64 = 0;
        let mut last_consumer_recreation: u64 = 0;
        let mut consumer_recreation_interval: u64 = 5;
        loop {
            current += 1;
            if current > max_times {
                break;
            }
            sleep(self.config.topic_deletion_status_poll_interval()).await;

            if !self
                .contains_topic_and_all_partitions_are_online(topic, None)
                .await?
            {
                info!(topic, attempts = current, "Topic has been deleted");
                return Ok(());
            }

            if current - last_consumer_recreation == consumer_recreation_interval {
                if let Err(e) = self.offset_fetcher.recreate_consumer().await {
                    warn!(topic, error = %e, "Failed to recreate observation consumer");
                }
                last_consumer_recreation = current;
                // Doubling cadence capped at 100 iterations; an overflowed
                // multiply also lands on the cap.
                consumer_recreation_interval = consumer_recreation_interval
                    .checked_mul(2)
                    .map(|v| v.min(MAX_CONSUMER_RECREATION_INTERVAL))
                    .unwrap_or(MAX_CONSUMER_RECREATION_INTERVAL);
            }
        }
        Err(Error::timed_out(
            format!("delete topic: {topic} ({current} poll attempts)"),
            start.elapsed().as_millis() as u64,
            None,
        ))
    }

    /// Retry wrapper over [`Self::ensure_topic_is_deleted_and_block`]:
    /// deletion may time out or fail transiently, so attempt up to
    /// [`MAX_TOPIC_DELETE_RETRIES`] times before bubbling the error up.
    /// The busy error is never retried.
    pub async fn ensure_topic_is_deleted_and_block_with_retry(&self, topic: &str) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.ensure_topic_is_deleted_and_block(topic).await {
                Ok(()) => return Ok(()),
                Err(e @ Error::DeletionUnderway) => return Err(e),
                Err(e) => {
                    attempts += 1;
                    warn!(
                        topic,
                        attempts,
                        max_attempts = MAX_TOPIC_DELETE_RETRIES,
                        error = %e,
                        "Topic deletion failed"
                    );
                    if attempts == MAX_TOPIC_DELETE_RETRIES {
                        error!(topic, error = %e, "Topic deletion failed, giving up");
                        return Err(e);
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Offset and partition queries
    // ---------------------------------------------------------------------

    /// Latest offset per partition, or an empty map when anything goes
    /// wrong.
    pub async fn get_topic_latest_offsets(&self, topic: &str) -> HashMap<i32, i64> {
        self.offset_fetcher.get_topic_latest_offsets(topic).await
    }

    pub async fn get_partition_latest_offset_and_retry(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        self.offset_fetcher
            .get_partition_latest_offset_and_retry(tp, retries)
            .await
    }

    pub async fn get_partition_earliest_offset_and_retry(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        self.offset_fetcher
            .get_partition_earliest_offset_and_retry(tp, retries)
            .await
    }

    pub async fn get_partition_offset_by_time(
        &self,
        tp: &TopicPartition,
        timestamp_ms: i64,
    ) -> Result<i64> {
        self.offset_fetcher
            .get_partition_offset_by_time(tp, timestamp_ms)
            .await
    }

    pub async fn get_producer_timestamp_of_last_data_record(
        &self,
        tp: &TopicPartition,
        retries: u32,
    ) -> Result<i64> {
        self.offset_fetcher
            .get_producer_timestamp_of_last_data_record(tp, retries)
            .await
    }

    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<PartitionInfo>> {
        self.offset_fetcher.partitions_for(topic).await
    }

    /// Replica count of the topic's first partition.
    pub async fn get_replication_factor(&self, topic: &str) -> Result<i32> {
        self.partitions_for(topic)
            .await?
            .first()
            .map(|info| info.replicas)
            .ok_or_else(|| Error::TopicDoesNotExist(topic.to_string()))
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Release, in order, the offset fetcher, the read-only admin and the
    /// write-only admin. Each step is best-effort.
    pub async fn close(&self) {
        let _guard = self.instance_lock.lock().await;
        self.offset_fetcher.close().await;
        if let Some(admin) = self.read_admin.get_if_initialized() {
            admin.close().await;
        }
        if let Some(admin) = self.write_admin.get_if_initialized() {
            admin.close().await;
        }
    }
}

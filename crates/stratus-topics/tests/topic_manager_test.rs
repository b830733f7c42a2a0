//! Integration tests for the topic manager over the in-memory broker model.

use std::sync::{Arc, Mutex};

use stratus_common::{
    CleanupPolicy, Error, TopicPartition, TopicProperties, CLEANUP_POLICY_CONFIG, LOG_APPEND_TIME,
    MESSAGE_TIMESTAMP_TYPE_CONFIG, MIN_COMPACTION_LAG_MS_CONFIG, MIN_INSYNC_REPLICAS_CONFIG,
    RETENTION_MS_CONFIG,
};
use stratus_pubsub::admin::{MemoryBrokerHandle, MemoryTopicAdmin, TopicAdmin};
use stratus_pubsub::consumer::{MemoryConsumerHandle, MemoryRawConsumer, PartitionConsumer};
use stratus_pubsub::{ConsumerConfig, UNKNOWN_TOPIC_RETENTION};
use stratus_topics::{ConsumerBuilder, TopicCreateSettings, TopicManager, TopicManagerConfig};

struct Fixture {
    manager: TopicManager,
    broker: MemoryBrokerHandle,
    records: MemoryConsumerHandle,
}

fn fixture_with_config(config: TopicManagerConfig) -> Fixture {
    let admin = MemoryTopicAdmin::new();
    let broker = admin.handle();

    let raw = MemoryRawConsumer::attached(broker.clone());
    let records = raw.handle();
    let first = Mutex::new(Some(PartitionConsumer::new(
        Box::new(raw),
        ConsumerConfig::default(),
    )));
    let rebuild_broker = broker.clone();
    let consumer_builder: ConsumerBuilder = Arc::new(move || {
        if let Some(consumer) = first.lock().unwrap().take() {
            return Ok(consumer);
        }
        Ok(PartitionConsumer::new(
            Box::new(MemoryRawConsumer::attached(rebuild_broker.clone())),
            ConsumerConfig::default(),
        ))
    });

    let manager = TopicManager::with_clients(
        Arc::new(admin.clone()) as Arc<dyn TopicAdmin>,
        Arc::new(admin) as Arc<dyn TopicAdmin>,
        consumer_builder,
        config,
    )
    .unwrap();

    Fixture {
        manager,
        broker,
        records,
    }
}

fn fixture() -> Fixture {
    fixture_with_config(TopicManagerConfig::default())
}

#[tokio::test]
async fn test_create_eternal_topic_properties() {
    let f = fixture();
    f.manager
        .create_topic("orders_v3", 12, 3, true)
        .await
        .unwrap();

    let props = f.broker.topic_props("orders_v3").unwrap();
    assert_eq!(
        props.get(RETENTION_MS_CONFIG),
        Some("9223372036854775807")
    );
    assert_eq!(props.get(CLEANUP_POLICY_CONFIG), Some("delete"));
    assert_eq!(
        props.get(MESSAGE_TIMESTAMP_TYPE_CONFIG),
        Some(LOG_APPEND_TIME)
    );

    assert!(f
        .manager
        .contains_topic_and_all_partitions_are_online("orders_v3", Some(12))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_create_compacted_topic_properties() {
    let f = fixture_with_config(TopicManagerConfig {
        min_log_compaction_lag_ms: 3_600_000,
        ..Default::default()
    });
    let settings = TopicCreateSettings {
        retention_ms: Some(86_400_000),
        log_compaction: true,
        min_in_sync_replicas: Some(2),
        ..Default::default()
    };
    f.manager
        .create_topic_with_settings("events", 6, 3, &settings)
        .await
        .unwrap();

    let props = f.broker.topic_props("events").unwrap();
    assert_eq!(props.get(RETENTION_MS_CONFIG), Some("86400000"));
    assert_eq!(props.get(CLEANUP_POLICY_CONFIG), Some("compact"));
    assert_eq!(props.get(MIN_COMPACTION_LAG_MS_CONFIG), Some("3600000"));
    assert_eq!(props.get(MIN_INSYNC_REPLICAS_CONFIG), Some("2"));
}

#[tokio::test]
async fn test_created_config_is_superset_of_requested_properties() {
    let f = fixture();
    let settings = TopicCreateSettings::with_retention(86_400_000);
    f.manager
        .create_topic_with_settings("orders", 4, 3, &settings)
        .await
        .unwrap();

    let mut requested = TopicProperties::new();
    requested.set_retention_ms(86_400_000);
    requested.set_cleanup_policy(CleanupPolicy::Delete);
    requested.set_log_append_timestamp_type();

    let actual = f.manager.get_topic_config("orders").await.unwrap();
    assert!(actual.contains_all(&requested));
}

#[tokio::test]
async fn test_create_recovers_from_topic_exists_race() {
    let f = fixture();
    // The topic is already there, created by a racing controller with a
    // different retention.
    let mut existing = TopicProperties::new();
    existing.set_retention_ms(1_000);
    f.broker.seed_topic("orders", 4, 3, existing);

    // Two transient failures first, then the broker reports the race.
    f.broker.push_create_error(Error::Transient("rf not settled".into()));
    f.broker.push_create_error(Error::Transient("rf not settled".into()));

    let settings = TopicCreateSettings::with_retention(86_400_000);
    f.manager
        .create_topic_with_settings("orders", 4, 3, &settings)
        .await
        .unwrap();

    // The create path converged by updating the retention instead.
    let props = f.broker.topic_props("orders").unwrap();
    assert_eq!(props.get(RETENTION_MS_CONFIG), Some("86400000"));
    assert_eq!(f.broker.create_calls(), 3);
    assert_eq!(f.broker.set_config_calls(), 1);
}

#[tokio::test]
async fn test_create_fails_with_timeout_error_on_terminal_failure() {
    let f = fixture();
    f.broker
        .push_create_error(Error::Broker("authorization failed".into()));

    let err = f
        .manager
        .create_topic("forbidden", 1, 3, false)
        .await
        .unwrap_err();
    match err {
        Error::OperationTimedOut { cause, .. } => {
            assert!(matches!(*cause.unwrap(), Error::Broker(_)));
        }
        other => panic!("expected a timeout wrapper, got {other}"),
    }
}

#[tokio::test]
async fn test_update_topic_retention_is_idempotent() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    let mutations_after_create = f.broker.set_config_calls();

    assert!(f
        .manager
        .update_topic_retention("orders", 86_400_000)
        .await
        .unwrap());
    assert!(!f
        .manager
        .update_topic_retention("orders", 86_400_000)
        .await
        .unwrap());
    // The second call performed no broker mutation.
    assert_eq!(f.broker.set_config_calls(), mutations_after_create + 1);
}

#[tokio::test]
async fn test_update_retention_of_missing_topic_fails() {
    let f = fixture();
    assert!(matches!(
        f.manager.update_topic_retention("ghost", 1).await,
        Err(Error::TopicDoesNotExist(_))
    ));
}

#[tokio::test]
async fn test_update_compaction_policy_skips_noop_round_trip() {
    let f = fixture_with_config(TopicManagerConfig {
        min_log_compaction_lag_ms: 3_600_000,
        ..Default::default()
    });
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    let baseline = f.broker.set_config_calls();

    f.manager
        .update_topic_compaction_policy("orders", true)
        .await
        .unwrap();
    assert_eq!(f.broker.set_config_calls(), baseline + 1);
    let props = f.broker.topic_props("orders").unwrap();
    assert_eq!(props.get(CLEANUP_POLICY_CONFIG), Some("compact"));
    assert_eq!(props.get(MIN_COMPACTION_LAG_MS_CONFIG), Some("3600000"));

    // Same policy again: nothing to write.
    f.manager
        .update_topic_compaction_policy("orders", true)
        .await
        .unwrap();
    assert_eq!(f.broker.set_config_calls(), baseline + 1);

    // Back to delete resets the compaction lag.
    f.manager
        .update_topic_compaction_policy("orders", false)
        .await
        .unwrap();
    let props = f.broker.topic_props("orders").unwrap();
    assert_eq!(props.get(CLEANUP_POLICY_CONFIG), Some("delete"));
    assert_eq!(props.get(MIN_COMPACTION_LAG_MS_CONFIG), Some("0"));
    assert!(f
        .manager
        .is_topic_compaction_enabled("orders")
        .await
        .map(|enabled| !enabled)
        .unwrap());
}

#[tokio::test]
async fn test_delete_of_absent_topic_returns_without_issuing_delete() {
    let f = fixture();
    f.manager
        .ensure_topic_is_deleted_and_block("gone")
        .await
        .unwrap();
    assert_eq!(f.broker.delete_calls(), 0);
}

#[tokio::test]
async fn test_delete_busy_when_another_deletion_is_underway() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    f.broker.set_deletion_underway(true);

    assert!(matches!(
        f.manager.ensure_topic_is_deleted_and_block("orders").await,
        Err(Error::DeletionUnderway)
    ));
    assert_eq!(f.broker.delete_calls(), 0);
}

#[tokio::test]
async fn test_delete_future_with_unknown_topic_cause_is_success() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    f.broker
        .set_delete_future_error(Error::TopicDoesNotExist("orders".into()));

    f.manager
        .ensure_topic_is_deleted_and_block("orders")
        .await
        .unwrap();
    assert!(!f.manager.contains_topic("orders").await.unwrap());
}

#[tokio::test]
async fn test_delete_confirmed_by_future() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    f.manager
        .ensure_topic_is_deleted_and_block("orders")
        .await
        .unwrap();
    assert!(!f.manager.contains_topic("orders").await.unwrap());
    assert_eq!(f.broker.delete_calls(), 1);
}

#[tokio::test]
async fn test_legacy_delete_polls_until_topic_disappears() {
    let f = fixture_with_config(TopicManagerConfig {
        topic_deletion_status_poll_interval_ms: 1,
        ..Default::default()
    });
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    f.broker.use_legacy_delete(Some(3));

    f.manager
        .ensure_topic_is_deleted_and_block("orders")
        .await
        .unwrap();
    assert!(!f.manager.contains_topic("orders").await.unwrap());
}

#[tokio::test]
async fn test_legacy_delete_times_out_and_retry_wrapper_gives_up() {
    let f = fixture_with_config(TopicManagerConfig {
        operation_timeout_ms: 40,
        topic_deletion_status_poll_interval_ms: 1,
        ..Default::default()
    });
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    // The broker never actually gets rid of the topic.
    f.broker.use_legacy_delete(None);

    let err = f
        .manager
        .ensure_topic_is_deleted_and_block_with_retry("orders")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OperationTimedOut { .. }));
    assert_eq!(f.broker.delete_calls(), 3);
}

#[tokio::test]
async fn test_truncation_check() {
    let f = fixture();
    let settings = TopicCreateSettings::with_retention(1_000);
    f.manager
        .create_topic_with_settings("short", 1, 1, &settings)
        .await
        .unwrap();

    assert!(f.manager.is_topic_truncated("short", 1_000).await.unwrap());
    assert!(!f.manager.is_topic_truncated("short", 999).await.unwrap());
    // Absent topics count as truncated.
    assert!(f.manager.is_topic_truncated("ghost", 1_000).await.unwrap());

    // A topic with no retention config reads as unknown, never truncated.
    f.broker.seed_topic("bare", 1, 1, TopicProperties::new());
    assert!(!f
        .manager
        .is_topic_truncated("bare", i64::MAX - 1)
        .await
        .unwrap());
    assert_eq!(
        f.manager.get_topic_retention("bare").await.unwrap(),
        UNKNOWN_TOPIC_RETENTION
    );
}

#[tokio::test]
async fn test_all_topic_retentions_reports_unknown_sentinel() {
    let f = fixture();
    let settings = TopicCreateSettings::with_retention(5_000);
    f.manager
        .create_topic_with_settings("configured", 1, 1, &settings)
        .await
        .unwrap();
    f.broker.seed_topic("bare", 1, 1, TopicProperties::new());

    let retentions = f.manager.get_all_topic_retentions().await.unwrap();
    assert_eq!(retentions.get("configured"), Some(&5_000));
    assert_eq!(retentions.get("bare"), Some(&UNKNOWN_TOPIC_RETENTION));
}

#[tokio::test]
async fn test_cached_config_serves_stale_reads_until_refetch() {
    let f = fixture();
    let settings = TopicCreateSettings::with_retention(1_000);
    f.manager
        .create_topic_with_settings("orders", 1, 1, &settings)
        .await
        .unwrap();
    f.manager.get_topic_config("orders").await.unwrap();

    // The broker-side config changes behind the manager's back.
    let mut newer = TopicProperties::new();
    newer.set_retention_ms(2_000);
    f.broker.seed_topic("orders", 1, 1, newer);

    // Advisory cache still answers with the last-seen config.
    let cached = f.manager.get_cached_topic_config("orders").await.unwrap();
    assert_eq!(cached.retention_ms(), Some(1_000));

    // An explicit fetch refreshes the cache.
    f.manager.get_topic_config("orders").await.unwrap();
    let cached = f.manager.get_cached_topic_config("orders").await.unwrap();
    assert_eq!(cached.retention_ms(), Some(2_000));
}

#[tokio::test]
async fn test_readiness_predicate_requires_in_sync_replicas() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    assert!(f
        .manager
        .contains_topic_and_all_partitions_are_online("orders", None)
        .await
        .unwrap());

    f.broker.set_in_sync("orders", false);
    assert!(!f
        .manager
        .contains_topic_and_all_partitions_are_online("orders", None)
        .await
        .unwrap());

    // Partition count mismatch also reads as not ready.
    f.broker.set_in_sync("orders", true);
    assert!(!f
        .manager
        .contains_topic_and_all_partitions_are_online("orders", Some(5))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_list_topics_and_expectation_retry() {
    let f = fixture();
    f.manager.create_topic("orders", 1, 1, false).await.unwrap();

    let topics = f.manager.list_topics().await.unwrap();
    assert!(topics.contains("orders"));

    assert!(f
        .manager
        .contains_topic_with_expectation_and_retry("orders", 3, true)
        .await
        .unwrap());
    assert!(f
        .manager
        .contains_topic_with_expectation_and_retry("ghost", 3, false)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_replication_factor_comes_from_partition_info() {
    let f = fixture();
    f.manager.create_topic("orders", 2, 3, false).await.unwrap();
    assert_eq!(f.manager.get_replication_factor("orders").await.unwrap(), 3);
}

#[tokio::test]
async fn test_offset_queries_flow_through_the_fetcher() {
    let f = fixture();
    f.manager.create_topic("orders", 1, 1, false).await.unwrap();
    let tp = TopicPartition::new("orders", 0);
    f.records.append(&tp, 0, 100);
    f.records.append(&tp, 1, 200);

    assert_eq!(
        f.manager
            .get_partition_latest_offset_and_retry(&tp, 3)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        f.manager
            .get_partition_earliest_offset_and_retry(&tp, 3)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        f.manager
            .get_partition_offset_by_time(&tp, 150)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        f.manager
            .get_producer_timestamp_of_last_data_record(&tp, 3)
            .await
            .unwrap(),
        200
    );
    let latest = f.manager.get_topic_latest_offsets("orders").await;
    assert_eq!(latest.get(&0), Some(&2));
}

#[tokio::test]
async fn test_close_is_reentrant_safe_and_best_effort() {
    let f = fixture();
    f.manager.create_topic("orders", 1, 1, false).await.unwrap();
    f.manager.close().await;
    f.manager.close().await;
}

//! Prometheus metrics for Stratus.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, Registry,
};
use std::sync::Arc;

lazy_static! {
    static ref ADMIN_OPERATIONS: CounterVec = register_counter_vec!(
        "stratus_admin_operations_total",
        "Total admin client operations",
        &["client", "operation", "result"]
    )
    .unwrap();

    static ref ADMIN_OPERATION_LATENCY: HistogramVec = register_histogram_vec!(
        "stratus_admin_operation_latency_seconds",
        "Admin client operation latency",
        &["client", "operation"]
    )
    .unwrap();

    static ref CONSUMER_POLL_RETRIES: CounterVec = register_counter_vec!(
        "stratus_consumer_poll_retries_total",
        "Total consumer poll retries after transient errors",
        &["client"]
    )
    .unwrap();

    static ref CONSUMER_POLLS: CounterVec = register_counter_vec!(
        "stratus_consumer_polls_total",
        "Total consumer poll attempts",
        &["client", "result"]
    )
    .unwrap();
}

/// Metrics registry
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
}

impl MetricsRegistry {
    /// Create new metrics registry
    pub fn new() -> Self {
        let registry = Registry::new();

        registry.register(Box::new(ADMIN_OPERATIONS.clone())).unwrap();
        registry
            .register(Box::new(ADMIN_OPERATION_LATENCY.clone()))
            .unwrap();
        registry
            .register(Box::new(CONSUMER_POLL_RETRIES.clone()))
            .unwrap();
        registry.register(Box::new(CONSUMER_POLLS.clone())).unwrap();

        Self {
            registry: Arc::new(registry),
        }
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Admin metrics scoped to one client instance.
    ///
    /// `unique_name` should identify both the implementation and the
    /// endpoint, e.g. `kafka_broker-1.example.com:9092`.
    pub fn admin(&self, unique_name: impl Into<String>) -> AdminMetrics {
        AdminMetrics::new(unique_name)
    }

    /// Consumer metrics scoped to one client instance.
    pub fn consumer(&self, unique_name: impl Into<String>) -> ConsumerMetrics {
        ConsumerMetrics::new(unique_name)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Admin client metrics
#[derive(Clone)]
pub struct AdminMetrics {
    client: String,
}

impl AdminMetrics {
    fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
        }
    }

    /// Record one admin operation outcome with its latency in seconds.
    pub fn record_operation(&self, operation: &str, success: bool, latency_secs: f64) {
        let result = if success { "success" } else { "failure" };
        ADMIN_OPERATIONS
            .with_label_values(&[&self.client, operation, result])
            .inc();
        ADMIN_OPERATION_LATENCY
            .with_label_values(&[&self.client, operation])
            .observe(latency_secs);
    }
}

/// Consumer metrics
#[derive(Clone)]
pub struct ConsumerMetrics {
    client: String,
}

impl ConsumerMetrics {
    fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
        }
    }

    /// Record a poll retry after a transient error.
    pub fn record_poll_retry(&self) {
        CONSUMER_POLL_RETRIES.with_label_values(&[&self.client]).inc();
    }

    /// Record a poll outcome.
    pub fn record_poll(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        CONSUMER_POLLS
            .with_label_values(&[&self.client, result])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_registers_once() {
        let registry = MetricsRegistry::new();
        let admin = registry.admin("kafka_localhost:9092");
        admin.record_operation("create_topic", true, 0.05);
        admin.record_operation("create_topic", false, 1.2);

        let consumer = registry.consumer("kafka_localhost:9092");
        consumer.record_poll(true);
        consumer.record_poll_retry();

        let families = registry.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "stratus_admin_operations_total"));
    }
}

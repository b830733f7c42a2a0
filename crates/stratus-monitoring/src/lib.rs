//! Monitoring and observability for Stratus.

pub mod metrics;
pub mod tracing;

pub use metrics::{AdminMetrics, ConsumerMetrics, MetricsRegistry};

//! Client wrappers over the pub/sub broker protocol: a typed admin façade
//! with read-only and write-only roles, a non-thread-safe raw consumer with
//! a retry-aware subscription engine, and the factory that builds them.

pub mod admin;
pub mod config;
pub mod consumer;
pub mod factory;

pub use admin::{DeleteTopicFuture, TopicAdmin, UNKNOWN_TOPIC_RETENTION};
pub use config::{AdminConfig, ConsumerConfig};
pub use consumer::{ConsumerRecord, PartitionConsumer, RawConsumer};
pub use factory::{
    register_admin_builder, AdminBuildContext, AdminBuilder, AdminRole, ClientFactory, SslConfig,
};

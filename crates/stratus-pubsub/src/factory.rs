//! Factory for admin clients and raw consumers.
//!
//! Admin implementations are selected by name through a registry populated
//! at startup; there is no runtime class loading. The read-only and
//! write-only roles are built independently and never share a client
//! handle.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use rdkafka::config::ClientConfig;
use tracing::info;

use stratus_common::{Error, Result};
use stratus_monitoring::MetricsRegistry;

use crate::admin::{InstrumentedTopicAdmin, KafkaTopicAdmin, TopicAdmin};
use crate::config::{AdminConfig, ConsumerConfig};
use crate::consumer::{KafkaRawConsumer, PartitionConsumer, RawConsumer};

pub const KAFKA_ADMIN_IMPL: &str = "kafka";

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS plumbing applied to every client this factory builds.
#[derive(Debug, Clone)]
pub struct SslConfig {
    pub ca_location: String,
    pub certificate_location: String,
    pub key_location: String,
}

impl SslConfig {
    pub(crate) fn apply(&self, config: &mut ClientConfig) {
        config
            .set("security.protocol", "ssl")
            .set("ssl.ca.location", &self.ca_location)
            .set("ssl.certificate.location", &self.certificate_location)
            .set("ssl.key.location", &self.key_location);
    }
}

/// Which half of the admin capability surface a client will serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRole {
    ReadOnly,
    WriteOnly,
}

impl AdminRole {
    fn as_str(&self) -> &'static str {
        match self {
            AdminRole::ReadOnly => "read-only",
            AdminRole::WriteOnly => "write-only",
        }
    }
}

/// Everything an admin builder needs to construct a client.
pub struct AdminBuildContext<'a> {
    pub bootstrap_servers: &'a str,
    pub ssl: Option<&'a SslConfig>,
    pub config: &'a AdminConfig,
    pub operation_timeout: Duration,
    pub role: AdminRole,
}

/// Constructor registered under an implementation name.
pub type AdminBuilder = fn(&AdminBuildContext<'_>) -> Result<Arc<dyn TopicAdmin>>;

static ADMIN_BUILDERS: OnceLock<RwLock<HashMap<String, AdminBuilder>>> = OnceLock::new();

fn admin_builders() -> &'static RwLock<HashMap<String, AdminBuilder>> {
    ADMIN_BUILDERS.get_or_init(|| {
        let mut builders: HashMap<String, AdminBuilder> = HashMap::new();
        builders.insert(KAFKA_ADMIN_IMPL.to_string(), build_kafka_admin);
        RwLock::new(builders)
    })
}

fn build_kafka_admin(ctx: &AdminBuildContext<'_>) -> Result<Arc<dyn TopicAdmin>> {
    Ok(Arc::new(KafkaTopicAdmin::new(
        ctx.bootstrap_servers,
        ctx.ssl,
        ctx.config.clone(),
        ctx.operation_timeout,
    )?))
}

/// Register an admin implementation under a name. Later registrations
/// shadow earlier ones.
pub fn register_admin_builder(name: &str, builder: AdminBuilder) {
    admin_builders().write().insert(name.to_string(), builder);
}

/// Builds admin clients and raw consumers bound to one bootstrap endpoint.
#[derive(Clone)]
pub struct ClientFactory {
    bootstrap_servers: String,
    ssl: Option<SslConfig>,
    read_only_admin_impl: String,
    write_only_admin_impl: String,
    admin_config: AdminConfig,
    consumer_config: ConsumerConfig,
    operation_timeout: Duration,
    metrics: Option<MetricsRegistry>,
}

impl ClientFactory {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            ssl: None,
            read_only_admin_impl: KAFKA_ADMIN_IMPL.to_string(),
            write_only_admin_impl: KAFKA_ADMIN_IMPL.to_string(),
            admin_config: AdminConfig::from_env(),
            consumer_config: ConsumerConfig::from_env(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    pub fn with_admin_impls(
        mut self,
        read_only: impl Into<String>,
        write_only: impl Into<String>,
    ) -> Self {
        self.read_only_admin_impl = read_only.into();
        self.write_only_admin_impl = write_only.into();
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_configs(mut self, admin: AdminConfig, consumer: ConsumerConfig) -> Self {
        self.admin_config = admin;
        self.consumer_config = consumer;
        self
    }

    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }

    pub fn consumer_config(&self) -> &ConsumerConfig {
        &self.consumer_config
    }

    /// Derive a factory for another endpoint, optionally swapping the
    /// metrics registry.
    pub fn clone_with(
        &self,
        bootstrap_servers: impl Into<String>,
        metrics: Option<MetricsRegistry>,
    ) -> Self {
        let mut factory = self.clone();
        factory.bootstrap_servers = bootstrap_servers.into();
        factory.metrics = metrics;
        factory
    }

    pub fn create_read_only_admin(&self) -> Result<Arc<dyn TopicAdmin>> {
        self.create_admin(AdminRole::ReadOnly, &self.read_only_admin_impl)
    }

    pub fn create_write_only_admin(&self) -> Result<Arc<dyn TopicAdmin>> {
        self.create_admin(AdminRole::WriteOnly, &self.write_only_admin_impl)
    }

    fn create_admin(&self, role: AdminRole, impl_name: &str) -> Result<Arc<dyn TopicAdmin>> {
        let builder = *admin_builders().read().get(impl_name).ok_or_else(|| {
            Error::Configuration(format!("unknown admin implementation: {impl_name}"))
        })?;

        let ctx = AdminBuildContext {
            bootstrap_servers: &self.bootstrap_servers,
            ssl: self.ssl.as_ref(),
            config: &self.admin_config,
            operation_timeout: self.operation_timeout,
            role,
        };
        let admin = builder(&ctx)?;
        info!(
            implementation = admin.class_name(),
            role = role.as_str(),
            bootstrap = %self.bootstrap_servers,
            "Created admin client"
        );

        Ok(match &self.metrics {
            Some(registry) => Arc::new(InstrumentedTopicAdmin::new(
                admin,
                registry,
                &self.bootstrap_servers,
            )),
            None => admin,
        })
    }

    /// Build a raw byte-level consumer. The receive buffer floor of 1 MiB
    /// from [`ConsumerConfig`] applies.
    pub fn create_raw_consumer(&self) -> Result<Box<dyn RawConsumer>> {
        Ok(Box::new(KafkaRawConsumer::new(
            &self.bootstrap_servers,
            self.ssl.as_ref(),
            &self.consumer_config,
            self.operation_timeout,
        )?))
    }

    /// Build the subscription engine over a fresh raw consumer.
    pub fn create_partition_consumer(&self) -> Result<PartitionConsumer> {
        let consumer = PartitionConsumer::new(
            self.create_raw_consumer()?,
            self.consumer_config.clone(),
        );
        Ok(match &self.metrics {
            Some(registry) => consumer.with_metrics(
                registry.consumer(format!("KafkaRawConsumer_{}", self.bootstrap_servers)),
            ),
            None => consumer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::MemoryTopicAdmin;

    fn build_memory_admin(_ctx: &AdminBuildContext<'_>) -> Result<Arc<dyn TopicAdmin>> {
        Ok(Arc::new(MemoryTopicAdmin::new()))
    }

    #[test]
    fn test_unknown_impl_is_a_configuration_error() {
        let factory =
            ClientFactory::new("localhost:9092").with_admin_impls("no-such-impl", "no-such-impl");
        assert!(matches!(
            factory.create_read_only_admin(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_registered_impl_is_found() {
        register_admin_builder("memory-factory-test", build_memory_admin);
        let factory = ClientFactory::new("localhost:9092")
            .with_admin_impls("memory-factory-test", "memory-factory-test");
        let admin = factory.create_read_only_admin().unwrap();
        assert_eq!(admin.class_name(), "MemoryTopicAdmin");
    }

    #[test]
    fn test_clone_with_replaces_bootstrap() {
        let factory = ClientFactory::new("a:9092");
        let derived = factory.clone_with("b:9092", None);
        assert_eq!(derived.bootstrap_servers(), "b:9092");
        assert_eq!(factory.bootstrap_servers(), "a:9092");
    }
}

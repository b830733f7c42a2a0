//! Tracing configuration.

use anyhow::Result;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter used when RUST_LOG is unset
    pub log_level: String,

    /// Include file/line in log output
    pub with_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_location: false,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init_tracing(service_name: &str, config: TracingConfig) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(config.with_location)
        .with_line_number(config.with_location);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init tracing for {service_name}: {e}"))?;

    Ok(())
}

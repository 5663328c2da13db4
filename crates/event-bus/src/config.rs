//! Bus selection from configuration.

use std::sync::Arc;

use crate::{InMemoryEventBus, JetStreamConfig, JetStreamEventBus, MessageBus, Result};

/// Bus configuration.
///
/// Reads from environment variables:
/// - `EVENT_BUS_BROKERS` — comma-separated broker URLs; absent or blank selects the in-process bus
/// - `USE_IN_MEMORY_BUS` — `true` forces the in-process bus even when brokers are set
/// - `EVENT_BUS_CLIENT_NAME` — connection name (default: `"fulfillment-service"`)
/// - `EVENT_BUS_STREAM_PREFIX` — stream name prefix (default: `"FULFILLMENT"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub brokers: Vec<String>,
    pub force_in_memory: bool,
    pub client_name: String,
    pub stream_prefix: String,
}

impl BusConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brokers: std::env::var("EVENT_BUS_BROKERS")
                .map(|v| parse_brokers(&v))
                .unwrap_or_default(),
            force_in_memory: std::env::var("USE_IN_MEMORY_BUS").is_ok_and(|v| v == "true"),
            client_name: std::env::var("EVENT_BUS_CLIENT_NAME").unwrap_or(defaults.client_name),
            stream_prefix: std::env::var("EVENT_BUS_STREAM_PREFIX")
                .unwrap_or(defaults.stream_prefix),
        }
    }

    /// Configuration pointing at the given comma-separated broker list.
    pub fn with_brokers(brokers: &str) -> Self {
        Self {
            brokers: parse_brokers(brokers),
            ..Self::default()
        }
    }

    /// Returns true if the in-process bus will be used.
    pub fn uses_in_memory(&self) -> bool {
        self.force_in_memory || self.brokers.is_empty()
    }

    /// JetStream settings derived from this configuration.
    pub fn jetstream(&self) -> JetStreamConfig {
        JetStreamConfig {
            servers: self.brokers.clone(),
            client_name: self.client_name.clone(),
            stream_prefix: self.stream_prefix.clone(),
            ..JetStreamConfig::default()
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        let jetstream = JetStreamConfig::default();
        Self {
            brokers: Vec::new(),
            force_in_memory: false,
            client_name: jetstream.client_name,
            stream_prefix: jetstream.stream_prefix,
        }
    }
}

/// Splits a comma-separated broker list, dropping blank entries.
pub fn parse_brokers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Builds the bus selected by `config`.
///
/// Callers hold the result as `Arc<dyn MessageBus>` and never need to know
/// which implementation they got.
pub async fn create_event_bus(config: &BusConfig) -> Result<Arc<dyn MessageBus>> {
    if config.uses_in_memory() {
        tracing::info!("using in-process event bus");
        return Ok(Arc::new(InMemoryEventBus::new()));
    }
    let bus = JetStreamEventBus::connect(config.jetstream()).await?;
    tracing::info!(brokers = ?config.brokers, "using JetStream event bus");
    Ok(Arc::new(bus))
}

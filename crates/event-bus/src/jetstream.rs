//! NATS JetStream bus.
//!
//! Each topic is backed by its own stream whose only subject is the topic
//! name. Subscribing binds a durable pull consumer named after the topic, so
//! every process subscribing to the same topic joins the same consumer
//! group and the stream's messages are shared out between them.
//!
//! Delivery is at-least-once: a message is acked only after its handler
//! returned, and one that was never acked (for instance because the process
//! died mid-handler) is redelivered. A handler that fails is not retried by
//! the bus; its message is terminated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::pull::{Config as PullConsumerConfig, Stream as MessageStream};
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, AckKind};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{BusError, EventEnvelope, MessageBus, RawHandler, Result};

/// Connection settings for [`JetStreamEventBus`].
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    /// Server URLs, e.g. `nats://localhost:4222`.
    pub servers: Vec<String>,
    /// Name reported to the server for this connection.
    pub client_name: String,
    /// Prefix for stream names, isolating deployments that share a server.
    pub stream_prefix: String,
    pub connection_timeout: Duration,
    /// How long a delivered message may stay unacked before it is redelivered.
    pub ack_wait: Duration,
    /// How long stream messages are retained.
    pub max_age: Duration,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            client_name: "fulfillment-service".to_string(),
            stream_prefix: "FULFILLMENT".to_string(),
            connection_timeout: Duration::from_secs(5),
            ack_wait: Duration::from_secs(30),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Durable bus backed by NATS JetStream.
#[derive(Clone)]
pub struct JetStreamEventBus {
    client: Client,
    jetstream: jetstream::Context,
    config: Arc<JetStreamConfig>,
    /// Consumer loops by topic; at most one per topic in this process.
    consumers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl JetStreamEventBus {
    /// Connects to the configured servers.
    pub async fn connect(config: JetStreamConfig) -> Result<Self> {
        let options = ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connection_timeout);

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());

        info!(servers = ?config.servers, "connected to NATS");
        Ok(Self {
            client,
            jetstream,
            config: Arc::new(config),
            consumers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Stream name backing a topic. Stream names may not contain dots.
    pub fn stream_name(&self, topic: &str) -> String {
        format!("{}_{}", self.config.stream_prefix, sanitize(topic).to_uppercase())
    }

    /// Durable consumer (group) name for a topic.
    pub fn consumer_name(topic: &str) -> String {
        format!("{}-consumer", sanitize(topic).replace('_', "-"))
    }

    /// Returns the stream backing a topic, creating it if it does not exist yet.
    pub async fn topic_stream(&self, topic: &str) -> Result<jetstream::stream::Stream> {
        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: self.stream_name(topic),
                subjects: vec![topic.to_string()],
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                max_age: self.config.max_age,
                ..Default::default()
            })
            .await
            .map_err(|e| subscribe_failed(topic, e))
    }

    /// Returns true if this process already consumes `topic`.
    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.consumers.lock().await.contains_key(topic)
    }
}

fn publish_failed(topic: &str, reason: impl std::fmt::Display) -> BusError {
    BusError::Publish {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

fn subscribe_failed(topic: &str, reason: impl std::fmt::Display) -> BusError {
    BusError::Subscribe {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

fn sanitize(topic: &str) -> String {
    topic
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

#[async_trait]
impl MessageBus for JetStreamEventBus {
    #[instrument(skip(self, payload))]
    async fn publish_raw(&self, topic: &str, payload: Value) -> Result<()> {
        let bytes = serde_json::to_vec(&payload)?;

        let ack = self
            .jetstream
            .publish(topic.to_string(), bytes.into())
            .await
            .map_err(|e| publish_failed(topic, e))?;
        // Wait until the server has stored the message.
        ack.await.map_err(|e| publish_failed(topic, e))?;

        metrics::counter!("bus_events_published_total", "bus" => "jetstream").increment(1);
        debug!("event published");
        Ok(())
    }

    #[instrument(skip(self, handler))]
    async fn subscribe_raw(&self, topic: &str, handler: RawHandler) -> Result<()> {
        let mut consumers = self.consumers.lock().await;
        if consumers.contains_key(topic) {
            debug!("already subscribed, ignoring");
            return Ok(());
        }

        let stream = self.topic_stream(topic).await?;
        let durable = Self::consumer_name(topic);
        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &durable,
                PullConsumerConfig {
                    durable_name: Some(durable.clone()),
                    deliver_policy: DeliverPolicy::New,
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| subscribe_failed(topic, e))?;
        let messages = consumer.messages().await.map_err(|e| subscribe_failed(topic, e))?;

        let task = tokio::spawn(consume(topic.to_string(), messages, handler));
        consumers.insert(topic.to_string(), task);
        info!(consumer = %durable, "subscribed");
        Ok(())
    }

    /// Without a stream for the topic a publish is rejected by the server, so
    /// publishers that may run before any subscriber provision it here.
    async fn ensure_topic(&self, topic: &str) -> Result<()> {
        self.topic_stream(topic).await?;
        debug!(%topic, "topic stream ready");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        for (topic, task) in self.consumers.lock().await.drain() {
            task.abort();
            debug!(%topic, "consumer stopped");
        }
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }
}

/// Longest pause between attempts while the message stream keeps failing.
const MAX_RECEIVE_BACKOFF: Duration = Duration::from_secs(5);

/// Pause after `failures` consecutive receive errors: 100ms, doubling up to
/// [`MAX_RECEIVE_BACKOFF`].
fn receive_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(6);
    Duration::from_millis(100 * 2u64.pow(exponent)).min(MAX_RECEIVE_BACKOFF)
}

/// Delivers messages to `handler` one at a time, preserving stream order.
async fn consume(topic: String, mut messages: MessageStream, handler: RawHandler) {
    let mut failures: u32 = 0;
    while let Some(next) = messages.next().await {
        let message = match next {
            Ok(message) => {
                failures = 0;
                message
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = receive_backoff(failures);
                warn!(%topic, error = %e, failures, ?delay, "error receiving message");
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let payload: Value = match serde_json::from_slice(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%topic, error = %e, "dropping undecodable message");
                if let Err(e) = message.ack_with(AckKind::Term).await {
                    warn!(%topic, error = %e, "failed to terminate message");
                }
                continue;
            }
        };

        let ack = match handler(EventEnvelope::new(topic.as_str(), payload)).await {
            Ok(()) => AckKind::Ack,
            Err(e) => {
                metrics::counter!("bus_handler_failures_total", "bus" => "jetstream").increment(1);
                error!(%topic, error = %e, "event handler failed");
                AckKind::Term
            }
        };
        if let Err(e) = message.ack_with(ack).await {
            warn!(%topic, error = %e, "failed to ack message");
        }
    }
    debug!(%topic, "message stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_subject_tokens() {
        assert_eq!(sanitize("order.created"), "order_created");
        assert_eq!(sanitize("a.*.>"), "a___");
    }

    #[test]
    fn consumer_name_is_keyed_by_topic() {
        assert_eq!(
            JetStreamEventBus::consumer_name("order.created"),
            "order-created-consumer"
        );
        assert_eq!(
            JetStreamEventBus::consumer_name("group-commerce.campaign.joined"),
            "group-commerce-campaign-joined-consumer"
        );
    }

    #[test]
    fn receive_backoff_doubles_up_to_cap() {
        assert_eq!(receive_backoff(1), Duration::from_millis(100));
        assert_eq!(receive_backoff(2), Duration::from_millis(200));
        assert_eq!(receive_backoff(4), Duration::from_millis(800));
        assert_eq!(receive_backoff(7), MAX_RECEIVE_BACKOFF);
        assert_eq!(receive_backoff(u32::MAX), MAX_RECEIVE_BACKOFF);
    }

    #[test]
    fn default_config_targets_local_server() {
        let config = JetStreamConfig::default();
        assert_eq!(config.servers, vec!["nats://localhost:4222".to_string()]);
        assert_eq!(config.stream_prefix, "FULFILLMENT");
    }
}

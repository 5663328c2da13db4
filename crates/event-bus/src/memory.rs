use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use crate::{BusError, EventEnvelope, MessageBus, RawHandler, Result};

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// What `publish` does when a subscriber fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerFailurePolicy {
    /// Record the failure on the side channel and let `publish` succeed.
    #[default]
    Isolate,
    /// Fail `publish` with the first handler error (after all handlers ran).
    Propagate,
}

/// A handler failure observed during in-process dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub topic: String,
    pub error: String,
    pub timestamp: i64,
}

struct Inner {
    handlers: RwLock<HashMap<String, Vec<RawHandler>>>,
    policy: HandlerFailurePolicy,
    failures: broadcast::Sender<HandlerFailure>,
}

/// In-process bus that invokes every handler of a topic before `publish` returns.
///
/// Nothing is queued or persisted: a topic without subscribers drops the
/// event, and subscriptions live only as long as this instance. Clones share
/// the same subscriber registry.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Creates a bus that isolates handler failures.
    pub fn new() -> Self {
        Self::with_policy(HandlerFailurePolicy::default())
    }

    /// Creates a bus with an explicit handler failure policy.
    pub fn with_policy(policy: HandlerFailurePolicy) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                policy,
                failures,
            }),
        }
    }

    pub fn policy(&self) -> HandlerFailurePolicy {
        self.inner.policy
    }

    /// Subscribes to the stream of handler failures.
    ///
    /// Only failures that happen after this call are received.
    pub fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.inner.failures.subscribe()
    }

    /// Returns the number of handlers registered for a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .read()
            .await
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryEventBus {
    #[tracing::instrument(skip(self, payload))]
    async fn publish_raw(&self, topic: &str, payload: Value) -> Result<()> {
        // Snapshot the handlers so they can publish or subscribe themselves.
        let handlers = match self.inner.handlers.read().await.get(topic) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                tracing::debug!("no subscribers, dropping event");
                return Ok(());
            }
        };

        let envelope = EventEnvelope::new(topic, payload);
        let results = join_all(handlers.iter().map(|handler| handler(envelope.clone()))).await;
        metrics::counter!("bus_events_published_total", "bus" => "in_memory").increment(1);

        let mut first_failure = None;
        for error in results.into_iter().filter_map(|r| r.err()) {
            let reason = error.to_string();
            metrics::counter!("bus_handler_failures_total", "bus" => "in_memory").increment(1);
            tracing::warn!(error = %reason, "event handler failed");
            // No receivers is fine; the channel is optional observability.
            let _ = self.inner.failures.send(HandlerFailure {
                topic: topic.to_string(),
                error: reason.clone(),
                timestamp: envelope.timestamp(),
            });
            first_failure.get_or_insert(reason);
        }

        match (self.inner.policy, first_failure) {
            (HandlerFailurePolicy::Propagate, Some(reason)) => Err(BusError::Handler {
                topic: topic.to_string(),
                reason,
            }),
            _ => Ok(()),
        }
    }

    async fn subscribe_raw(&self, topic: &str, handler: RawHandler) -> Result<()> {
        self.inner
            .handlers
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        tracing::debug!(topic, "handler registered");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.handlers.write().await.clear();
        Ok(())
    }
}

//! The bus contract shared by every implementation.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{EventEnvelope, Result};

/// Error type returned by subscriber handlers. Any error converts into it with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A type-erased handler receiving JSON envelopes.
pub type RawHandler =
    Arc<dyn Fn(EventEnvelope<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Core publish/subscribe contract.
///
/// Payloads cross this trait as JSON so the trait stays object safe and a
/// bus can be chosen at runtime behind `Arc<dyn MessageBus>`. Typed access
/// is provided by [`MessageBusExt`].
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to a topic.
    ///
    /// Broker and serialization failures are returned to the caller.
    async fn publish_raw(&self, topic: &str, payload: Value) -> Result<()>;

    /// Registers a handler invoked once per envelope delivered on `topic`.
    async fn subscribe_raw(&self, topic: &str, handler: RawHandler) -> Result<()>;

    /// Makes sure `topic` can accept publishes before anyone subscribes to it.
    ///
    /// Buses that need no provisioning keep the default, which does nothing.
    async fn ensure_topic(&self, _topic: &str) -> Result<()> {
        Ok(())
    }

    /// Releases subscriptions and broker connections.
    async fn disconnect(&self) -> Result<()>;
}

/// Typed convenience methods over [`MessageBus`].
pub trait MessageBusExt: MessageBus {
    /// Serializes `payload` and publishes it to `topic`.
    fn publish<'a, T>(&'a self, topic: &'a str, payload: &T) -> BoxFuture<'a, Result<()>>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload);
        Box::pin(async move { self.publish_raw(topic, value?).await })
    }

    /// Subscribes a handler that receives payloads decoded as `T`.
    ///
    /// A payload that does not decode as `T` counts as a handler failure.
    fn subscribe<'a, T, F, Fut>(&'a self, topic: &'a str, handler: F) -> BoxFuture<'a, Result<()>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(EventEnvelope<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_raw(topic, typed_handler(handler))
    }
}

// Blanket implementation for all MessageBus implementations
impl<B: MessageBus + ?Sized> MessageBusExt for B {}

/// Adapts a typed handler into a [`RawHandler`].
pub fn typed_handler<T, F, Fut>(handler: F) -> RawHandler
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(EventEnvelope<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(
        move |envelope: EventEnvelope<Value>| -> BoxFuture<'static, HandlerResult> {
            match envelope.decode::<T>() {
                Ok(typed) => Box::pin(handler(typed)),
                Err(e) => Box::pin(std::future::ready(Err(e.into()))),
            }
        },
    )
}

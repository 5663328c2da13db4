//! Publish/subscribe message bus.
//!
//! Services never call each other directly; they publish payloads to named
//! topics and subscribe handlers to the topics they care about. Two
//! interchangeable implementations of [`MessageBus`] are provided:
//!
//! - [`InMemoryEventBus`]: synchronous in-process fan-out, used for tests and
//!   for collapsing several services into one process
//! - [`JetStreamEventBus`]: durable, at-least-once delivery backed by NATS
//!   JetStream with one durable consumer group per topic
//!
//! [`create_event_bus`] picks the implementation once, from [`BusConfig`].

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod jetstream;
pub mod memory;

pub use bus::{HandlerError, HandlerResult, MessageBus, MessageBusExt, RawHandler, typed_handler};
pub use config::{BusConfig, create_event_bus};
pub use envelope::EventEnvelope;
pub use error::{BusError, Result};
pub use jetstream::{JetStreamConfig, JetStreamEventBus};
pub use memory::{HandlerFailure, HandlerFailurePolicy, InMemoryEventBus};

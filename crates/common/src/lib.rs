//! Shared contracts for the fulfillment services.
//!
//! Every service that talks over the bus agrees on the topic names in
//! [`topics`] and the payload shapes in [`events`]. Payloads use camelCase
//! field names on the wire.

pub mod events;
pub mod topics;
pub mod types;

pub use events::{InventoryStatus, InventoryStatusEvent, OrderCreatedEvent, OrderLineItem};
pub use types::OrderId;

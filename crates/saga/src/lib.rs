//! Reservation saga for newly created orders.
//!
//! The saga listens on `order.created`, commits every line item against the
//! stock ledger with an atomic conditional decrement and announces the
//! outcome on `inventory.reserved` or `inventory.insufficient`:
//!
//! ```text
//! order.created ──► claim order ──► reserve each SKU ──┬──► inventory.reserved
//!                        │                              └──► inventory.insufficient
//!                        └──► already claimed: skip
//! ```
//!
//! Line items that succeeded are kept when another item of the same order
//! is short, unless [`CompensationPolicy::ReleaseReserved`] is selected. A
//! ledger or bus error is different: the attempt is undone entirely and the
//! order is left unclaimed for its redelivery.

pub mod error;
pub mod reservation;

pub use error::{Result, SagaError};
pub use reservation::{CompensationPolicy, ReservationSaga, SagaOutcome, aggregate_line_items};

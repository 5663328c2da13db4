//! Saga error types.

use event_bus::BusError;
use inventory::InventoryError;
use thiserror::Error;

/// Errors that can occur while running the reservation saga.
///
/// Running out of stock is not an error; it is reported through
/// `inventory.insufficient`.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The stock ledger could not be read or written.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The outcome event could not be published.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

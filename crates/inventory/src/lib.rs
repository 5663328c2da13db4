//! Stock ledger for the reservation saga.
//!
//! The ledger is only ever decremented through [`InventoryStore::reserve`],
//! a single atomic "decrement by N if at least N remain". That predicate is
//! the only concurrency control on stock, so quantities can never go
//! negative no matter how many reservations race.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{InventoryError, Result};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use store::{InventoryStore, Reservation, StockLevel};

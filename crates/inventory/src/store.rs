use std::sync::Arc;

use async_trait::async_trait;
use common::{InventoryStatus, OrderId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Current quantity on hand for a SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub sku: String,
    pub quantity: u32,
}

impl StockLevel {
    pub fn new(sku: impl Into<String>, quantity: u32) -> Self {
        Self {
            sku: sku.into(),
            quantity,
        }
    }
}

/// Outcome of one conditional decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub order_id: OrderId,
    pub sku: String,
    pub quantity: u32,
    pub status: InventoryStatus,
}

impl Reservation {
    pub fn reserved(order_id: &OrderId, sku: &str, quantity: u32) -> Self {
        Self::with_status(order_id, sku, quantity, InventoryStatus::Reserved)
    }

    pub fn insufficient(order_id: &OrderId, sku: &str, quantity: u32) -> Self {
        Self::with_status(order_id, sku, quantity, InventoryStatus::Insufficient)
    }

    fn with_status(order_id: &OrderId, sku: &str, quantity: u32, status: InventoryStatus) -> Self {
        Self {
            order_id: order_id.clone(),
            sku: sku.to_string(),
            quantity,
            status,
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.status == InventoryStatus::Reserved
    }
}

/// Contract of the stock ledger backing the reservation saga.
///
/// A reservation of zero units always succeeds without touching the ledger.
/// An unknown SKU has nothing on hand.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Sets the quantity on hand, creating the SKU if needed.
    async fn set_stock(&self, level: StockLevel) -> Result<()>;

    /// Returns the quantity on hand, or None for an unknown SKU.
    async fn get_stock(&self, sku: &str) -> Result<Option<StockLevel>>;

    /// Returns every SKU, ordered by SKU.
    async fn list_all(&self) -> Result<Vec<StockLevel>>;

    /// Atomically decrements `sku` by `quantity` if at least `quantity` is on hand.
    ///
    /// When the predicate does not hold nothing changes and the outcome is
    /// insufficient.
    async fn reserve(&self, order_id: &OrderId, sku: &str, quantity: u32) -> Result<Reservation>;

    /// Returns previously reserved units to the ledger. The quantity on hand
    /// saturates at `u32::MAX`.
    async fn release(&self, sku: &str, quantity: u32) -> Result<()>;

    /// Records that a reservation for `order_id` is being attempted.
    ///
    /// Returns true for the first call per order and false for every later
    /// one, so a redelivered order can be recognised before any decrement.
    async fn claim_order(&self, order_id: &OrderId) -> Result<bool>;

    /// Forgets the claim on `order_id`, so its next delivery is handled again.
    ///
    /// Used when a reservation attempt fails before its outcome is published.
    async fn release_claim(&self, order_id: &OrderId) -> Result<()>;
}

#[async_trait]
impl<T: InventoryStore + ?Sized> InventoryStore for Arc<T> {
    async fn set_stock(&self, level: StockLevel) -> Result<()> {
        (**self).set_stock(level).await
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<StockLevel>> {
        (**self).get_stock(sku).await
    }

    async fn list_all(&self) -> Result<Vec<StockLevel>> {
        (**self).list_all().await
    }

    async fn reserve(&self, order_id: &OrderId, sku: &str, quantity: u32) -> Result<Reservation> {
        (**self).reserve(order_id, sku, quantity).await
    }

    async fn release(&self, sku: &str, quantity: u32) -> Result<()> {
        (**self).release(sku, quantity).await
    }

    async fn claim_order(&self, order_id: &OrderId) -> Result<bool> {
        (**self).claim_order(order_id).await
    }

    async fn release_claim(&self, order_id: &OrderId) -> Result<()> {
        (**self).release_claim(order_id).await
    }
}

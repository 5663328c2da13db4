//! Event payloads exchanged over the bus.

use serde::{Deserialize, Serialize};

use crate::OrderId;

/// One line of an order as announced on `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub sku: String,
    pub quantity: u32,
    /// Unit price; carried through for downstream consumers, unused by the saga.
    #[serde(default)]
    pub price: f64,
}

impl OrderLineItem {
    pub fn new(sku: impl Into<String>, quantity: u32, price: f64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            price,
        }
    }
}

/// Payload of `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub customer_id: String,
    pub total: f64,
    pub items: Vec<OrderLineItem>,
}

/// Outcome carried by the inventory topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    Reserved,
    Insufficient,
}

impl InventoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::Reserved => "reserved",
            InventoryStatus::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `inventory.reserved` and `inventory.insufficient`.
///
/// `sku` and `quantity` are only present on the insufficient variant and name
/// the first line item that could not be committed. `quantity` is the summed
/// request for that SKU, which may exceed what a single line item can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStatusEvent {
    pub order_id: OrderId,
    pub status: InventoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

impl InventoryStatusEvent {
    pub fn reserved(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: InventoryStatus::Reserved,
            sku: None,
            quantity: None,
        }
    }

    pub fn insufficient(order_id: OrderId, sku: impl Into<String>, quantity: u64) -> Self {
        Self {
            order_id,
            status: InventoryStatus::Insufficient,
            sku: Some(sku.into()),
            quantity: Some(quantity),
        }
    }
}

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::{InventoryStore, Reservation, Result, StockLevel};

#[derive(Debug, Default)]
struct LedgerState {
    stock: BTreeMap<String, u32>,
    claimed_orders: HashSet<OrderId>,
}

/// In-memory stock ledger.
///
/// The check and the decrement of a reservation happen under one write
/// lock, which gives the same atomicity as the conditional `UPDATE` of the
/// PostgreSQL ledger. Clones share the same ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with the given levels.
    pub async fn with_stock(levels: impl IntoIterator<Item = StockLevel>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for level in levels {
                state.stock.insert(level.sku, level.quantity);
            }
        }
        store
    }

    /// Returns the number of orders claimed so far.
    pub async fn claimed_order_count(&self) -> usize {
        self.state.read().await.claimed_orders.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn set_stock(&self, level: StockLevel) -> Result<()> {
        self.state
            .write()
            .await
            .stock
            .insert(level.sku, level.quantity);
        Ok(())
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<StockLevel>> {
        let state = self.state.read().await;
        Ok(state.stock.get(sku).map(|&quantity| StockLevel::new(sku, quantity)))
    }

    async fn list_all(&self) -> Result<Vec<StockLevel>> {
        let state = self.state.read().await;
        Ok(state
            .stock
            .iter()
            .map(|(sku, &quantity)| StockLevel::new(sku.as_str(), quantity))
            .collect())
    }

    async fn reserve(&self, order_id: &OrderId, sku: &str, quantity: u32) -> Result<Reservation> {
        if quantity == 0 {
            return Ok(Reservation::reserved(order_id, sku, quantity));
        }

        let mut state = self.state.write().await;
        match state.stock.get_mut(sku) {
            Some(available) if *available >= quantity => {
                *available -= quantity;
                Ok(Reservation::reserved(order_id, sku, quantity))
            }
            _ => Ok(Reservation::insufficient(order_id, sku, quantity)),
        }
    }

    async fn release(&self, sku: &str, quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let available = state.stock.entry(sku.to_string()).or_default();
        *available = available.saturating_add(quantity);
        Ok(())
    }

    async fn claim_order(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.state.write().await.claimed_orders.insert(order_id.clone()))
    }

    async fn release_claim(&self, order_id: &OrderId) -> Result<()> {
        self.state.write().await.claimed_orders.remove(order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InventoryStatus;

    fn order() -> OrderId {
        OrderId::from("order-1")
    }

    #[tokio::test]
    async fn test_reserve_decrements_when_sufficient() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 5)]).await;

        let reservation = store.reserve(&order(), "A", 4).await.unwrap();

        assert_eq!(reservation.status, InventoryStatus::Reserved);
        assert_eq!(store.get_stock("A").await.unwrap(), Some(StockLevel::new("A", 1)));
    }

    #[tokio::test]
    async fn test_reserve_exact_quantity_empties_ledger() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 3)]).await;

        assert!(store.reserve(&order(), "A", 3).await.unwrap().is_reserved());
        assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_leaves_ledger_untouched() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("B", 0)]).await;

        let reservation = store.reserve(&order(), "B", 1).await.unwrap();

        assert_eq!(reservation, Reservation::insufficient(&order(), "B", 1));
        assert_eq!(store.get_stock("B").await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_unknown_sku_is_insufficient() {
        let store = InMemoryInventoryStore::new();

        let reservation = store.reserve(&order(), "missing", 1).await.unwrap();

        assert!(!reservation.is_reserved());
        assert_eq!(store.get_stock("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_quantity_is_always_reserved() {
        let store = InMemoryInventoryStore::new();
        assert!(store.reserve(&order(), "missing", 0).await.unwrap().is_reserved());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_go_negative() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 10)]).await;

        let mut tasks = Vec::new();
        for i in 0..25 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .reserve(&OrderId::from(format!("order-{i}")), "A", 1)
                    .await
                    .unwrap()
            }));
        }
        let mut reserved = 0;
        for task in tasks {
            if task.await.unwrap().is_reserved() {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 10);
        assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_release_returns_units() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 2)]).await;
        store.reserve(&order(), "A", 2).await.unwrap();

        store.release("A", 2).await.unwrap();

        assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_release_saturates_at_max_quantity() {
        let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", u32::MAX - 1)]).await;

        store.release("A", 5).await.unwrap();

        assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, u32::MAX);
    }

    #[tokio::test]
    async fn test_released_claim_can_be_taken_again() {
        let store = InMemoryInventoryStore::new();
        assert!(store.claim_order(&order()).await.unwrap());

        store.release_claim(&order()).await.unwrap();

        assert_eq!(store.claimed_order_count().await, 0);
        assert!(store.claim_order(&order()).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_order_only_once() {
        let store = InMemoryInventoryStore::new();

        assert!(store.claim_order(&order()).await.unwrap());
        assert!(!store.claim_order(&order()).await.unwrap());
        assert!(store.claim_order(&OrderId::from("order-2")).await.unwrap());
        assert_eq!(store.claimed_order_count().await, 2);
    }

    #[tokio::test]
    async fn test_list_all_is_sorted_by_sku() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(StockLevel::new("b", 1)).await.unwrap();
        store.set_stock(StockLevel::new("a", 2)).await.unwrap();
        store.set_stock(StockLevel::new("b", 3)).await.unwrap();

        assert_eq!(
            store.list_all().await.unwrap(),
            vec![StockLevel::new("a", 2), StockLevel::new("b", 3)]
        );
    }
}

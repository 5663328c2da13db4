//! Integration tests for the reservation saga wired to an in-process bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{InventoryStatusEvent, OrderCreatedEvent, OrderId, OrderLineItem, topics};
use event_bus::{
    BusError, EventEnvelope, HandlerFailurePolicy, InMemoryEventBus, MessageBus, MessageBusExt,
    RawHandler,
};
use inventory::{
    InMemoryInventoryStore, InventoryError, InventoryStore, Reservation, StockLevel,
};
use saga::{CompensationPolicy, ReservationSaga, SagaError, SagaOutcome};
use serde_json::Value;

type Recorded = Arc<Mutex<Vec<InventoryStatusEvent>>>;

struct TestHarness {
    bus: InMemoryEventBus,
    store: InMemoryInventoryStore,
    reserved: Recorded,
    insufficient: Recorded,
}

impl TestHarness {
    async fn new(stock: Vec<StockLevel>) -> Self {
        Self::with(stock, CompensationPolicy::None).await
    }

    async fn with(stock: Vec<StockLevel>, compensation: CompensationPolicy) -> Self {
        let bus = InMemoryEventBus::new();
        let store = InMemoryInventoryStore::with_stock(stock).await;

        let saga = Arc::new(
            ReservationSaga::new(store.clone(), Arc::new(bus.clone()))
                .with_compensation(compensation),
        );
        saga.register().await.unwrap();

        let reserved = record(&bus, topics::INVENTORY_RESERVED).await;
        let insufficient = record(&bus, topics::INVENTORY_INSUFFICIENT).await;

        Self {
            bus,
            store,
            reserved,
            insufficient,
        }
    }

    async fn place(&self, order: &OrderCreatedEvent) {
        self.bus.publish(topics::ORDER_CREATED, order).await.unwrap();
    }

    async fn stock(&self, sku: &str) -> u32 {
        self.store.get_stock(sku).await.unwrap().unwrap().quantity
    }
}

async fn record(bus: &InMemoryEventBus, topic: &str) -> Recorded {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    bus.subscribe(topic, move |envelope: EventEnvelope<InventoryStatusEvent>| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(envelope.into_payload());
            Ok(())
        }
    })
    .await
    .unwrap();
    recorded
}

fn order(id: &str, items: &[(&str, u32)]) -> OrderCreatedEvent {
    OrderCreatedEvent {
        order_id: OrderId::from(id),
        customer_id: "customer-1".to_string(),
        total: 0.0,
        items: items
            .iter()
            .map(|(sku, quantity)| OrderLineItem::new(*sku, *quantity, 9.99))
            .collect(),
    }
}

#[tokio::test]
async fn test_repeated_sku_is_reserved_as_one_sum() {
    let h = TestHarness::new(vec![StockLevel::new("A", 5)]).await;

    h.place(&order("order-1", &[("A", 2), ("A", 2)])).await;

    assert_eq!(h.stock("A").await, 1);
    let reserved = h.reserved.lock().unwrap().clone();
    assert_eq!(reserved, vec![InventoryStatusEvent::reserved(OrderId::from("order-1"))]);
    assert!(h.insufficient.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_stock_sku_publishes_insufficient() {
    let h = TestHarness::new(vec![StockLevel::new("B", 0)]).await;

    h.place(&order("order-2", &[("B", 1)])).await;

    let insufficient = h.insufficient.lock().unwrap().clone();
    assert_eq!(
        insufficient,
        vec![InventoryStatusEvent::insufficient(OrderId::from("order-2"), "B", 1)]
    );
    assert!(h.reserved.lock().unwrap().is_empty());
    assert_eq!(h.stock("B").await, 0);
}

#[tokio::test]
async fn test_unknown_sku_is_insufficient() {
    let h = TestHarness::new(vec![]).await;

    h.place(&order("order-3", &[("GHOST", 1)])).await;

    let insufficient = h.insufficient.lock().unwrap().clone();
    assert_eq!(insufficient.len(), 1);
    assert_eq!(insufficient[0].sku.as_deref(), Some("GHOST"));
}

#[tokio::test]
async fn test_first_short_sku_in_order_of_appearance_is_reported() {
    let h = TestHarness::new(vec![
        StockLevel::new("A", 10),
        StockLevel::new("B", 0),
        StockLevel::new("C", 0),
    ])
    .await;

    h.place(&order("order-4", &[("C", 2), ("A", 1), ("B", 1), ("C", 1)])).await;

    let insufficient = h.insufficient.lock().unwrap().clone();
    assert_eq!(
        insufficient,
        vec![InventoryStatusEvent::insufficient(OrderId::from("order-4"), "C", 3)]
    );
    // Without compensation the successful line stays committed.
    assert_eq!(h.stock("A").await, 9);
}

#[tokio::test]
async fn test_summed_quantity_beyond_ledger_range_is_insufficient() {
    let h = TestHarness::new(vec![StockLevel::new("A", u32::MAX)]).await;

    h.place(&order("order-big", &[("A", u32::MAX), ("A", 1)])).await;

    let insufficient = h.insufficient.lock().unwrap().clone();
    assert_eq!(
        insufficient,
        vec![InventoryStatusEvent::insufficient(
            OrderId::from("order-big"),
            "A",
            u64::from(u32::MAX) + 1
        )]
    );
    assert!(h.reserved.lock().unwrap().is_empty());
    assert_eq!(h.stock("A").await, u32::MAX);
}

#[tokio::test]
async fn test_compensation_restores_partial_reservations() {
    let h = TestHarness::with(
        vec![StockLevel::new("A", 10), StockLevel::new("B", 0)],
        CompensationPolicy::ReleaseReserved,
    )
    .await;

    h.place(&order("order-5", &[("A", 4), ("B", 1)])).await;

    assert_eq!(h.stock("A").await, 10);
    assert_eq!(h.insufficient.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_redelivered_order_is_reserved_once() {
    let h = TestHarness::new(vec![StockLevel::new("A", 5)]).await;
    let event = order("order-6", &[("A", 2)]);

    h.place(&event).await;
    h.place(&event).await;

    assert_eq!(h.stock("A").await, 3);
    assert_eq!(h.reserved.lock().unwrap().len(), 1);
    assert_eq!(h.store.claimed_order_count().await, 1);
}

#[tokio::test]
async fn test_reserve_order_reports_duplicate() {
    let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 5)]).await;
    let saga = ReservationSaga::new(store, Arc::new(InMemoryEventBus::new()));
    let event = order("order-7", &[("A", 1)]);

    assert_eq!(saga.reserve_order(&event).await.unwrap(), SagaOutcome::Reserved);
    assert_eq!(saga.reserve_order(&event).await.unwrap(), SagaOutcome::Duplicate);
    assert_eq!(saga.store().get_stock("A").await.unwrap().unwrap().quantity, 4);
}

#[tokio::test]
async fn test_concurrent_orders_never_oversell() {
    let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 10)]).await;
    let saga = Arc::new(ReservationSaga::new(
        store.clone(),
        Arc::new(InMemoryEventBus::new()),
    ));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let saga = saga.clone();
            tokio::spawn(async move {
                saga.reserve_order(&order(&format!("order-{i}"), &[("A", 1)]))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut reserved = 0;
    for task in tasks {
        if task.await.unwrap() == SagaOutcome::Reserved {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 10);
    assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 0);
}

/// Ledger whose reservations always fail.
struct FailingStore;

#[async_trait]
impl InventoryStore for FailingStore {
    async fn set_stock(&self, _level: StockLevel) -> inventory::Result<()> {
        Ok(())
    }

    async fn get_stock(&self, _sku: &str) -> inventory::Result<Option<StockLevel>> {
        Ok(None)
    }

    async fn list_all(&self) -> inventory::Result<Vec<StockLevel>> {
        Ok(Vec::new())
    }

    async fn reserve(
        &self,
        _order_id: &OrderId,
        sku: &str,
        _quantity: u32,
    ) -> inventory::Result<Reservation> {
        Err(InventoryError::QuantityOutOfRange {
            sku: sku.to_string(),
            value: -1,
        })
    }

    async fn release(&self, _sku: &str, _quantity: u32) -> inventory::Result<()> {
        Ok(())
    }

    async fn claim_order(&self, _order_id: &OrderId) -> inventory::Result<bool> {
        Ok(true)
    }

    async fn release_claim(&self, _order_id: &OrderId) -> inventory::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_failure_surfaces_through_propagating_bus() {
    let bus = InMemoryEventBus::with_policy(HandlerFailurePolicy::Propagate);
    let saga = Arc::new(ReservationSaga::new(FailingStore, Arc::new(bus.clone())));
    saga.register().await.unwrap();

    let result = bus
        .publish(topics::ORDER_CREATED, &order("order-8", &[("A", 1)]))
        .await;

    assert!(matches!(
        result,
        Err(BusError::Handler { ref topic, .. }) if topic == topics::ORDER_CREATED
    ));
}

#[tokio::test]
async fn test_store_failure_is_isolated_by_default() {
    let bus = InMemoryEventBus::new();
    let saga = Arc::new(ReservationSaga::new(FailingStore, Arc::new(bus.clone())));
    saga.register().await.unwrap();
    let mut failures = bus.failures();

    bus.publish(topics::ORDER_CREATED, &order("order-9", &[("A", 1)]))
        .await
        .unwrap();

    let failure = failures.try_recv().unwrap();
    assert_eq!(failure.topic, topics::ORDER_CREATED);
    assert!(failure.error.contains("out of range"));
}

#[tokio::test]
async fn test_malformed_order_is_a_handler_failure() {
    let bus = InMemoryEventBus::new();
    let store = InMemoryInventoryStore::new();
    let saga = Arc::new(ReservationSaga::new(store.clone(), Arc::new(bus.clone())));
    saga.register().await.unwrap();
    let mut failures = bus.failures();

    bus.publish_raw(topics::ORDER_CREATED, serde_json::json!({"orderId": 42}))
        .await
        .unwrap();

    assert!(failures.try_recv().is_ok());
    assert_eq!(store.claimed_order_count().await, 0);
}

/// In-memory ledger whose first `failures` reservations error.
struct FlakyStore {
    inner: InMemoryInventoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: InMemoryInventoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl InventoryStore for FlakyStore {
    async fn set_stock(&self, level: StockLevel) -> inventory::Result<()> {
        self.inner.set_stock(level).await
    }

    async fn get_stock(&self, sku: &str) -> inventory::Result<Option<StockLevel>> {
        self.inner.get_stock(sku).await
    }

    async fn list_all(&self) -> inventory::Result<Vec<StockLevel>> {
        self.inner.list_all().await
    }

    async fn reserve(
        &self,
        order_id: &OrderId,
        sku: &str,
        quantity: u32,
    ) -> inventory::Result<Reservation> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(InventoryError::QuantityOutOfRange {
                sku: sku.to_string(),
                value: -1,
            });
        }
        self.inner.reserve(order_id, sku, quantity).await
    }

    async fn release(&self, sku: &str, quantity: u32) -> inventory::Result<()> {
        self.inner.release(sku, quantity).await
    }

    async fn claim_order(&self, order_id: &OrderId) -> inventory::Result<bool> {
        self.inner.claim_order(order_id).await
    }

    async fn release_claim(&self, order_id: &OrderId) -> inventory::Result<()> {
        self.inner.release_claim(order_id).await
    }
}

#[tokio::test]
async fn test_ledger_failure_leaves_order_for_redelivery() {
    let ledger =
        InMemoryInventoryStore::with_stock([StockLevel::new("A", 5), StockLevel::new("B", 3)])
            .await;
    let saga = ReservationSaga::new(
        FlakyStore::new(ledger.clone(), 1),
        Arc::new(InMemoryEventBus::new()),
    );
    let event = order("order-flaky", &[("A", 2), ("B", 1)]);

    let first = saga.reserve_order(&event).await;
    assert!(matches!(first, Err(SagaError::Inventory(_))));
    assert_eq!(ledger.get_stock("A").await.unwrap().unwrap().quantity, 5);
    assert_eq!(ledger.get_stock("B").await.unwrap().unwrap().quantity, 3);
    assert_eq!(ledger.claimed_order_count().await, 0);

    assert_eq!(saga.reserve_order(&event).await.unwrap(), SagaOutcome::Reserved);
    assert_eq!(ledger.get_stock("A").await.unwrap().unwrap().quantity, 3);
    assert_eq!(ledger.get_stock("B").await.unwrap().unwrap().quantity, 2);
}

/// In-process bus that records provisioned topics and can reject publishes.
#[derive(Default)]
struct ScriptedBus {
    inner: InMemoryEventBus,
    ensured: Mutex<Vec<String>>,
    rejected_publishes: AtomicUsize,
}

impl ScriptedBus {
    fn rejecting(publishes: usize) -> Self {
        Self {
            rejected_publishes: AtomicUsize::new(publishes),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MessageBus for ScriptedBus {
    async fn publish_raw(&self, topic: &str, payload: Value) -> event_bus::Result<()> {
        let rejected = self
            .rejected_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "no stream for subject".to_string(),
            });
        }
        self.inner.publish_raw(topic, payload).await
    }

    async fn subscribe_raw(&self, topic: &str, handler: RawHandler) -> event_bus::Result<()> {
        self.inner.subscribe_raw(topic, handler).await
    }

    async fn ensure_topic(&self, topic: &str) -> event_bus::Result<()> {
        self.ensured.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> event_bus::Result<()> {
        self.inner.disconnect().await
    }
}

#[tokio::test]
async fn test_register_provisions_outcome_topics() {
    let bus = Arc::new(ScriptedBus::default());
    let saga = Arc::new(ReservationSaga::new(InMemoryInventoryStore::new(), bus.clone()));

    saga.register().await.unwrap();

    let ensured = bus.ensured.lock().unwrap().clone();
    assert_eq!(
        ensured,
        vec![
            topics::INVENTORY_RESERVED.to_string(),
            topics::INVENTORY_INSUFFICIENT.to_string()
        ]
    );
}

#[tokio::test]
async fn test_rejected_outcome_publish_returns_stock_and_claim() {
    let store = InMemoryInventoryStore::with_stock([StockLevel::new("A", 5)]).await;
    let bus = Arc::new(ScriptedBus::rejecting(1));
    let saga = ReservationSaga::new(store.clone(), bus);
    let event = order("order-unpublished", &[("A", 2)]);

    let first = saga.reserve_order(&event).await;
    assert!(matches!(first, Err(SagaError::Bus(BusError::Publish { .. }))));
    assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 5);
    assert_eq!(store.claimed_order_count().await, 0);

    assert_eq!(saga.reserve_order(&event).await.unwrap(), SagaOutcome::Reserved);
    assert_eq!(store.get_stock("A").await.unwrap().unwrap().quantity, 3);
}

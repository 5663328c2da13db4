//! The reservation saga.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use common::{InventoryStatusEvent, OrderCreatedEvent, OrderId, OrderLineItem, topics};
use event_bus::{EventEnvelope, HandlerError, MessageBus, MessageBusExt};
use futures_util::future::join_all;
use inventory::{InventoryStore, Reservation};

use crate::Result;

/// What happens to line items already reserved when another item of the
/// same order turns out to be insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationPolicy {
    /// Keep them reserved.
    #[default]
    None,
    /// Return them to the ledger before announcing the failure.
    ReleaseReserved,
}

/// Result of handling one `order.created` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// Every line item was committed; `inventory.reserved` was published.
    Reserved,
    /// At least one line item was short; `inventory.insufficient` was
    /// published naming the first one.
    Insufficient { sku: String, quantity: u64 },
    /// The order had already been handled; nothing was done.
    Duplicate,
}

/// Reacts to created orders by committing their stock.
///
/// A delivery either publishes an outcome event or leaves no trace: when the
/// ledger or the bus fails midway, committed lines are returned and the claim
/// on the order is dropped, so a redelivery starts over.
pub struct ReservationSaga<S: InventoryStore> {
    store: S,
    bus: Arc<dyn MessageBus>,
    compensation: CompensationPolicy,
}

impl<S: InventoryStore + 'static> ReservationSaga<S> {
    /// Creates a saga that keeps partial reservations.
    pub fn new(store: S, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            store,
            bus,
            compensation: CompensationPolicy::default(),
        }
    }

    /// Sets the compensation policy.
    pub fn with_compensation(mut self, compensation: CompensationPolicy) -> Self {
        self.compensation = compensation;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Provisions the outcome topics, then subscribes the saga to
    /// `order.created` on its bus.
    pub async fn register(self: Arc<Self>) -> Result<()> {
        for topic in [topics::INVENTORY_RESERVED, topics::INVENTORY_INSUFFICIENT] {
            self.bus.ensure_topic(topic).await?;
        }

        let bus = Arc::clone(&self.bus);
        bus.subscribe(
            topics::ORDER_CREATED,
            move |envelope: EventEnvelope<OrderCreatedEvent>| {
                let saga = Arc::clone(&self);
                async move {
                    saga.handle_order_created(envelope)
                        .await
                        .map(|_| ())
                        .map_err(HandlerError::from)
                }
            },
        )
        .await?;
        tracing::info!(topic = topics::ORDER_CREATED, "reservation saga registered");
        Ok(())
    }

    /// Handles one delivery of an `order.created` event.
    pub async fn handle_order_created(
        &self,
        envelope: EventEnvelope<OrderCreatedEvent>,
    ) -> Result<SagaOutcome> {
        self.reserve_order(envelope.payload()).await
    }

    /// Runs the saga for one order.
    ///
    /// Each distinct SKU gets exactly one conditional decrement for the sum
    /// of its quantities. All SKUs are attempted even when one fails; the
    /// failure event names the first short SKU in order of appearance.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn reserve_order(&self, order: &OrderCreatedEvent) -> Result<SagaOutcome> {
        let started = Instant::now();

        if !self.store.claim_order(&order.order_id).await? {
            metrics::counter!("saga_duplicate_deliveries_total").increment(1);
            tracing::info!("order already handled, skipping redelivery");
            return Ok(SagaOutcome::Duplicate);
        }

        let mut held = Vec::new();
        let result = self.commit_order(order, &mut held).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("saga_reservations_total", "outcome" => "failed").increment(1);
                tracing::warn!(error = %e, held = held.len(), "reservation failed, undoing it");
                self.roll_back(order, &held).await;
                return Err(e);
            }
        };

        let label = match outcome {
            SagaOutcome::Reserved => "reserved",
            _ => "insufficient",
        };
        metrics::counter!("saga_reservations_total", "outcome" => label).increment(1);
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Reserves every line and publishes the outcome. Lines that are
    /// committed and not yet returned to the ledger are left in `held`.
    async fn commit_order(
        &self,
        order: &OrderCreatedEvent,
        held: &mut Vec<Reservation>,
    ) -> Result<SagaOutcome> {
        let lines = aggregate_line_items(&order.items);
        let attempts = join_all(
            lines
                .iter()
                .map(|(sku, requested)| self.reserve_line(&order.order_id, sku, *requested)),
        )
        .await;

        let mut short = None;
        let mut failure = None;
        for ((sku, requested), attempt) in lines.iter().zip(attempts) {
            match attempt {
                Ok(Some(reservation)) if reservation.is_reserved() => held.push(reservation),
                Ok(_) => {
                    short.get_or_insert((sku.as_str(), *requested));
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        match short {
            Some((sku, quantity)) => {
                if self.compensation == CompensationPolicy::ReleaseReserved {
                    self.release_held(held).await?;
                }
                let event =
                    InventoryStatusEvent::insufficient(order.order_id.clone(), sku, quantity);
                self.bus.publish(topics::INVENTORY_INSUFFICIENT, &event).await?;
                tracing::warn!(sku, quantity, "insufficient stock");
                Ok(SagaOutcome::Insufficient {
                    sku: sku.to_string(),
                    quantity,
                })
            }
            None => {
                let event = InventoryStatusEvent::reserved(order.order_id.clone());
                self.bus.publish(topics::INVENTORY_RESERVED, &event).await?;
                tracing::info!(skus = lines.len(), "inventory reserved");
                Ok(SagaOutcome::Reserved)
            }
        }
    }

    /// One conditional decrement. A request larger than any ledger quantity
    /// can hold is short without touching the ledger, reported as `None`.
    async fn reserve_line(
        &self,
        order_id: &OrderId,
        sku: &str,
        requested: u64,
    ) -> inventory::Result<Option<Reservation>> {
        match u32::try_from(requested) {
            Ok(quantity) => self.store.reserve(order_id, sku, quantity).await.map(Some),
            Err(_) => {
                tracing::debug!(sku, requested, "request exceeds any ledger quantity");
                Ok(None)
            }
        }
    }

    /// Returns held lines to the ledger, removing each once it is back.
    async fn release_held(&self, held: &mut Vec<Reservation>) -> Result<()> {
        while let Some(reservation) = held.last() {
            self.store
                .release(&reservation.sku, reservation.quantity)
                .await?;
            tracing::debug!(sku = %reservation.sku, quantity = reservation.quantity, "reservation released");
            held.pop();
        }
        Ok(())
    }

    /// Undoes a failed attempt: held lines go back and the claim is dropped.
    /// Failures here are logged; the attempt's own error is what the caller sees.
    async fn roll_back(&self, order: &OrderCreatedEvent, held: &[Reservation]) {
        for reservation in held {
            if let Err(e) = self.store.release(&reservation.sku, reservation.quantity).await {
                tracing::error!(sku = %reservation.sku, quantity = reservation.quantity, error = %e, "failed to return reserved units");
            }
        }
        if let Err(e) = self.store.release_claim(&order.order_id).await {
            tracing::error!(error = %e, "failed to release order claim");
        }
    }
}

/// Sums quantities per SKU, keeping SKUs in order of first appearance.
///
/// Sums are kept in `u64` so no combination of line items can wrap or cap.
pub fn aggregate_line_items(items: &[OrderLineItem]) -> Vec<(String, u64)> {
    let mut lines: Vec<(String, u64)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for item in items {
        let quantity = u64::from(item.quantity);
        match positions.get(item.sku.as_str()) {
            Some(&index) => lines[index].1 += quantity,
            None => {
                positions.insert(item.sku.as_str(), lines.len());
                lines.push((item.sku.clone(), quantity));
            }
        }
    }
    lines
}

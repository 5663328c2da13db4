//! Inventory worker.
//!
//! Hosts the reservation saga on the configured bus and exposes the stock
//! ledger over HTTP together with health and Prometheus metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_bus::MessageBus;
use inventory::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::ReservationSaga;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub bus_kind: &'static str,
    pub tenant_id: String,
}

impl AppState {
    pub fn new(store: Arc<dyn InventoryStore>, config: &Config) -> Self {
        Self {
            store,
            bus_kind: if config.bus.uses_in_memory() {
                "in_memory"
            } else {
                "jetstream"
            },
            tenant_id: config.tenant_id.clone(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/inventory",
            get(routes::inventory::list).put(routes::inventory::set_stock),
        )
        .route("/inventory/{sku}", get(routes::inventory::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Opens the stock ledger selected by `config`.
///
/// With a database URL the PostgreSQL ledger is used and its migrations are
/// applied; otherwise an empty in-memory ledger is created.
pub async fn connect_store(config: &Config) -> inventory::Result<Arc<dyn InventoryStore>> {
    let Some(url) = &config.database_url else {
        tracing::info!("using in-memory inventory ledger");
        return Ok(Arc::new(InMemoryInventoryStore::new()));
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PostgresInventoryStore::for_tenant(pool, config.tenant_id.as_str());
    store.run_migrations().await?;
    tracing::info!(tenant = %config.tenant_id, "using PostgreSQL inventory ledger");
    Ok(Arc::new(store))
}

/// Subscribes a reservation saga over `store` to `bus`.
///
/// Registration provisions the outcome topics first, so on a durable bus the
/// saga's events are stored even before any downstream service subscribes.
pub async fn start_saga(
    store: Arc<dyn InventoryStore>,
    bus: Arc<dyn MessageBus>,
) -> saga::Result<()> {
    Arc::new(ReservationSaga::new(store, bus)).register().await
}

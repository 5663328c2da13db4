//! Coverage-lane client for the orchestration authority.
//!
//! [`CoverageLaneClient`] talks to the authority over HTTP with a bearer
//! credential and a per-request deadline. Lane lookups go through a
//! [`LaneCache`], which serves repeated lookups from memory for a TTL and
//! merges concurrent lookups for the same destination into one request.
//! [`ServiceAdapters`] applies the same treatment to the order and shipping
//! services used at checkout.
//!
//! A timeout is reported as [`CoverageError::Timeout`], distinct from both
//! transport failures and answers the authority rejected.

pub mod adapters;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
mod http;
pub mod policy;
pub mod types;

pub use adapters::ServiceAdapters;
pub use cache::LaneCache;
pub use client::{CoverageLaneClient, OrchestrationClient};
pub use config::{AdapterConfig, CoverageClientConfig};
pub use error::{CoverageError, Result};
pub use policy::{
    CheckoutLine, CreateOrderRequest, DEFAULT_POLICY_CATEGORY, OrderDraft, PolicyLineInput,
    PolicyPreviewRequest, normalize_policy_lines, policy_request_from_draft,
};
pub use types::{
    CoverageLane, PolicyCheck, PolicyCheckRequest, PolicyCheckResponse, PolicyLine,
    RebalanceRequest, RebalanceScope, WorkflowHandle,
};

//! Client for the orchestration authority.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::config::normalize_base_url;
use crate::http::send_json;
use crate::{
    CoverageClientConfig, CoverageError, CoverageLane, LaneCache, PolicyCheckRequest,
    PolicyCheckResponse, RebalanceRequest, Result, WorkflowHandle,
};

const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

/// Operations offered by the orchestration authority.
///
/// Every call is bounded by the configured request timeout and never
/// retried. Only [`list_coverage_lanes`](Self::list_coverage_lanes) is
/// cached.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    async fn evaluate_checkout_policy(
        &self,
        request: &PolicyCheckRequest,
    ) -> Result<PolicyCheckResponse>;

    /// Lanes covering `destination_state`. A blank destination yields no
    /// lanes without contacting the authority.
    async fn list_coverage_lanes(&self, destination_state: &str) -> Result<Vec<CoverageLane>>;

    async fn trigger_rebalance(&self, request: &RebalanceRequest) -> Result<WorkflowHandle>;
}

/// HTTP implementation of [`OrchestrationClient`].
#[derive(Clone)]
pub struct CoverageLaneClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    lanes: LaneCache,
}

impl CoverageLaneClient {
    pub fn new(config: CoverageClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", config.api_key))?);
        if let Some(tenant) = &config.tenant_id {
            headers.insert(TENANT_HEADER, header_value(tenant)?);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CoverageError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
            timeout: config.request_timeout,
            lanes: LaneCache::new(config.lane_cache_ttl),
        })
    }

    /// Builds a client from the environment, or None if it is not configured.
    pub fn from_env() -> Option<Result<Self>> {
        CoverageClientConfig::from_env().map(Self::new)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The cache backing [`list_coverage_lanes`](OrchestrationClient::list_coverage_lanes).
    pub fn lane_cache(&self) -> &LaneCache {
        &self.lanes
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/orchestration/{}", self.base_url, path)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CoverageError::InvalidConfig(e.to_string()))
}

#[async_trait]
impl OrchestrationClient for CoverageLaneClient {
    #[tracing::instrument(skip(self, request), fields(brand_id = %request.brand_id))]
    async fn evaluate_checkout_policy(
        &self,
        request: &PolicyCheckRequest,
    ) -> Result<PolicyCheckResponse> {
        let builder = self.http.post(self.url("checkout-policy")).json(request);
        send_json(builder, self.timeout, "evaluateCheckoutPolicy").await
    }

    #[tracing::instrument(skip(self))]
    async fn list_coverage_lanes(&self, destination_state: &str) -> Result<Vec<CoverageLane>> {
        let destination = destination_state.trim();
        if destination.is_empty() {
            return Ok(Vec::new());
        }

        let builder = self
            .http
            .get(self.url("coverage-lanes"))
            .query(&[("destinationState", destination)]);
        let timeout = self.timeout;
        self.lanes
            .get_or_fetch(&LaneCache::normalize_key(destination), move || {
                send_json(builder, timeout, "listCoverageLanes")
            })
            .await
    }

    #[tracing::instrument(skip(self, request), fields(brand_id = %request.brand_id, scope = ?request.scope))]
    async fn trigger_rebalance(&self, request: &RebalanceRequest) -> Result<WorkflowHandle> {
        let builder = self.http.post(self.url("rebalance")).json(request);
        send_json(builder, self.timeout, "triggerRebalance").await
    }
}

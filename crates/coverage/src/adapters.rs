//! Adapters for the order and shipping services used during checkout.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::normalize_base_url;
use crate::http::send_json;
use crate::policy::{DEFAULT_POLICY_CATEGORY, normalize_policy_lines};
use crate::{
    AdapterConfig, CoverageError, CoverageLane, CreateOrderRequest, LaneCache,
    PolicyCheckResponse, PolicyLine, PolicyPreviewRequest, Result,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyPreviewBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<&'a str>,
    brand_id: &'a str,
    destination_state: &'a str,
    items: Vec<PolicyLine>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LanePreviewBody {
    destination_state: String,
}

#[derive(Deserialize)]
struct LanePreview {
    lanes: Vec<CoverageLane>,
}

/// Typed calls to the orders and shipping services.
#[derive(Clone)]
pub struct ServiceAdapters {
    http: reqwest::Client,
    orders_url: String,
    shipping_url: String,
    timeout: Duration,
    lanes: LaneCache,
}

impl ServiceAdapters {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CoverageError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            orders_url: normalize_base_url(&config.orders_service_url),
            shipping_url: normalize_base_url(&config.shipping_service_url),
            timeout: config.request_timeout,
            lanes: LaneCache::new(config.lane_cache_ttl),
        })
    }

    pub fn lane_cache(&self) -> &LaneCache {
        &self.lanes
    }

    /// Asks the orders service to evaluate checkout policy for a draft.
    /// Lines without a category are sent as `General`.
    #[tracing::instrument(skip(self, request), fields(brand_id = %request.brand_id))]
    pub async fn preview_policy(&self, request: &PolicyPreviewRequest) -> Result<PolicyCheckResponse> {
        let body = PolicyPreviewBody {
            tenant_id: request.tenant_id.as_deref(),
            brand_id: &request.brand_id,
            destination_state: &request.destination_state,
            items: normalize_policy_lines(&request.items, DEFAULT_POLICY_CATEGORY),
        };
        let builder = self
            .http
            .post(format!("{}/orders/policy-preview", self.orders_url))
            .json(&body);
        send_json(builder, self.timeout, "previewPolicy").await
    }

    /// Creates an order, returning the service's representation as-is.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Map<String, Value>> {
        let builder = self
            .http
            .post(format!("{}/orders", self.orders_url))
            .json(request);
        send_json(builder, self.timeout, "createOrder").await
    }

    /// Shipping lanes for a destination, cached like the authority's
    /// coverage lanes.
    #[tracing::instrument(skip(self))]
    pub async fn preview_shipping_lanes(&self, destination_state: &str) -> Result<Vec<CoverageLane>> {
        let destination = destination_state.trim();
        if destination.is_empty() {
            return Ok(Vec::new());
        }

        let builder = self
            .http
            .post(format!("{}/shipping/lane-preview", self.shipping_url))
            .json(&LanePreviewBody {
                destination_state: destination.to_string(),
            });
        let timeout = self.timeout;
        self.lanes
            .get_or_fetch(&LaneCache::normalize_key(destination), move || async move {
                let preview: LanePreview =
                    send_json(builder, timeout, "previewShippingLanes").await?;
                Ok::<_, CoverageError>(preview.lanes)
            })
            .await
    }
}

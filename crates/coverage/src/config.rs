//! Client configuration loaded from environment variables.

use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_COVERAGE_LANE_CACHE_TTL_MS: u64 = 15_000;
pub const DEFAULT_ADAPTER_LANE_CACHE_TTL_MS: u64 = 10_000;

/// Settings for [`CoverageLaneClient`](crate::CoverageLaneClient).
///
/// Reads from environment variables:
/// - `ORCHESTRATION_API_BASE_URL` — authority base URL (required)
/// - `ORCHESTRATION_API_KEY` — bearer credential (required)
/// - `ORCHESTRATION_TENANT_ID` — sent as `X-Tenant-ID` when set
/// - `ORCHESTRATION_REQUEST_TIMEOUT_MS` — per-request deadline (default: `3000`)
/// - `COVERAGE_LANE_CACHE_TTL_MS` — lane cache lifetime, `0` disables caching (default: `15000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub tenant_id: Option<String>,
    pub request_timeout: Duration,
    pub lane_cache_ttl: Duration,
}

impl CoverageClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            tenant_id: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            lane_cache_ttl: Duration::from_millis(DEFAULT_COVERAGE_LANE_CACHE_TTL_MS),
        }
    }

    /// Loads configuration from the environment.
    ///
    /// Returns None when the base URL or the API key is missing or blank,
    /// in which case the caller runs without an authority.
    pub fn from_env() -> Option<Self> {
        let base_url = non_blank_var("ORCHESTRATION_API_BASE_URL")?;
        let api_key = non_blank_var("ORCHESTRATION_API_KEY")?;
        Some(Self {
            tenant_id: non_blank_var("ORCHESTRATION_TENANT_ID"),
            request_timeout: millis_var(
                "ORCHESTRATION_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            ),
            lane_cache_ttl: millis_var(
                "COVERAGE_LANE_CACHE_TTL_MS",
                DEFAULT_COVERAGE_LANE_CACHE_TTL_MS,
            ),
            ..Self::new(base_url, api_key)
        })
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_lane_cache_ttl(mut self, ttl: Duration) -> Self {
        self.lane_cache_ttl = ttl;
        self
    }
}

/// Settings for [`ServiceAdapters`](crate::ServiceAdapters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub orders_service_url: String,
    pub shipping_service_url: String,
    pub request_timeout: Duration,
    pub lane_cache_ttl: Duration,
}

impl AdapterConfig {
    pub fn new(orders_service_url: impl Into<String>, shipping_service_url: impl Into<String>) -> Self {
        Self {
            orders_service_url: orders_service_url.into(),
            shipping_service_url: shipping_service_url.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            lane_cache_ttl: Duration::from_millis(DEFAULT_ADAPTER_LANE_CACHE_TTL_MS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_lane_cache_ttl(mut self, ttl: Duration) -> Self {
        self.lane_cache_ttl = ttl;
        self
    }
}

/// Strips trailing slashes so paths can be appended with a single `/`.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn non_blank_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn millis_var(name: &str, default: u64) -> Duration {
    let millis = match std::env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(name, %value, default, "ignoring unparsable duration");
            default
        }),
        Err(_) => default,
    };
    Duration::from_millis(millis)
}

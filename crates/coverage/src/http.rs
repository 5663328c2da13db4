//! Bounded JSON request execution shared by the client and the adapters.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::{CoverageError, Result};

/// Sends `request` and decodes a JSON response, all within `timeout`.
///
/// The deadline covers the whole exchange including the body. When it
/// expires the in-flight request is dropped, which aborts the connection.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
    operation: &'static str,
) -> Result<T> {
    metrics::counter!("coverage_requests_total", "operation" => operation).increment(1);

    match tokio::time::timeout(timeout, exchange(request, timeout, operation)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(operation, timeout)),
    }
}

async fn exchange<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
    operation: &'static str,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            timed_out(operation, timeout)
        } else {
            CoverageError::Transport {
                operation,
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| CoverageError::Transport {
        operation,
        message: e.to_string(),
    })?;

    if !status.is_success() {
        tracing::warn!(operation, status = status.as_u16(), "remote request rejected");
        return Err(CoverageError::Authority {
            operation,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| CoverageError::Decode {
        operation,
        message: e.to_string(),
    })
}

fn timed_out(operation: &'static str, timeout: Duration) -> CoverageError {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    metrics::counter!("coverage_timeouts_total", "operation" => operation).increment(1);
    tracing::warn!(operation, timeout_ms, "remote request timed out");
    CoverageError::Timeout {
        operation,
        timeout_ms,
    }
}

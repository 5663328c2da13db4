use thiserror::Error;

/// Errors returned by the coverage-lane authority and the service adapters.
///
/// `Clone` so that one failed fetch can be handed to every caller that was
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverageError {
    /// The remote side did not answer within the request timeout.
    #[error("request timed out ({operation}) after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The request never produced a response (connection refused, DNS, TLS).
    #[error("request failed ({operation}): {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The remote side answered with a non-success status.
    #[error("request failed: {status} {body}")]
    Authority {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("invalid response ({operation}): {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoverageError {
    /// Returns true if the failure was a timeout rather than an answer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoverageError::Timeout { .. })
    }
}

/// Result type for coverage operations.
pub type Result<T> = std::result::Result<T, CoverageError>;

//! Control-plane error types.

use thiserror::Error;

/// Errors from control-plane REST calls.
#[derive(Debug, Error)]
pub enum ControlError {
    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Control plane returned a non-success status
    #[error("control plane error: status {status}")]
    Api { status: u16 },

    /// Response body did not match the contract
    #[error("malformed control-plane response: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlError {
    /// Whether a retry on the next tick is likely to succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status } => matches!(status, 500..=599 | 429),
            Self::Json(_) => false,
        }
    }
}

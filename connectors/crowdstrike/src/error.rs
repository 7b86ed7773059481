//! CrowdStrike-specific error types.

use thiserror::Error;

/// Errors from the CrowdStrike adapter.
#[derive(Debug, Error)]
pub enum CrowdStrikeError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("CrowdStrike API error: status {status}, body: {body}")]
    Api { status: u16, body: String },

    /// Token acquisition failed, or a request stayed unauthorized after a
    /// forced refresh
    #[error("CrowdStrike auth failed: status {status}, body: {body}")]
    Auth { status: u16, body: String },

    /// Response body did not parse
    #[error("malformed CrowdStrike response: {message}, body: {snippet}")]
    Malformed { message: String, snippet: String },

    /// The sync was cancelled; `fetched` events were already published
    #[error("fetch cancelled after {fetched} events")]
    Cancelled { fetched: usize },
}

impl CrowdStrikeError {
    /// Cancellation is surfaced distinctly so the controller can leave the
    /// sync status untouched.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, 500..=599 | 429),
            Self::Malformed { .. } => true,
            Self::Auth { .. } | Self::Cancelled { .. } => false,
        }
    }
}

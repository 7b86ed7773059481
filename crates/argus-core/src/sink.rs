//! The streaming seam between vendor connectors and the sync controller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::Event;

/// Error surfaced by a sink.
///
/// Publishing is at-least-once and deduplicated downstream, so connectors
/// log sink failures and keep paginating rather than aborting the sync.
#[derive(Debug, Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-page callbacks installed by the sync controller.
///
/// A connector must call [`SyncSink::publish_page`] for each page after it
/// is transformed and before the next page is requested, so peak memory is
/// bounded by one page. [`SyncSink::advance_checkpoint`] is called once, on
/// terminal resource success, with the window's end time; the checkpoint
/// store applies a monotonic guard, so out-of-order calls cannot move the
/// checkpoint backwards.
#[async_trait]
pub trait SyncSink: Send + Sync {
    async fn publish_page(&self, events: Vec<Event>) -> Result<(), SinkError>;

    async fn advance_checkpoint(&self, through: DateTime<Utc>);
}

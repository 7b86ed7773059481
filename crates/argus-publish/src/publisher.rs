//! The publisher.

use std::sync::Arc;
use std::time::Duration;

use argus_clickhouse::{ClickHouseClient, StoreError};
use argus_core::Event;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::DEFAULT_BATCH_SIZE;

const VECTOR_TIMEOUT: Duration = Duration::from_secs(30);
const VECTOR_RETRIES: u32 = 3;
const VECTOR_RETRY_GAP: Duration = Duration::from_secs(2);

/// Errors from publishing a batch.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Direct ClickHouse insert failed
    #[error("clickhouse insert failed: {0}")]
    Store(#[from] StoreError),

    /// Vector transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Vector rejected the payload
    #[error("vector error: status {status}, body: {body}")]
    Vector { status: u16, body: String },
}

/// Publishes normalised events downstream.
#[derive(Clone)]
pub struct Publisher {
    vector_url: String,
    http: reqwest::Client,
    clickhouse: Option<Arc<ClickHouseClient>>,
}

impl Publisher {
    /// Create a publisher. When `clickhouse` is `None`, every batch goes
    /// through the Vector fallback.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialised.
    #[must_use]
    pub fn new(vector_url: impl Into<String>, clickhouse: Option<Arc<ClickHouseClient>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(VECTOR_TIMEOUT)
            .build()
            .expect("reqwest client");

        Self {
            vector_url: vector_url.into(),
            http,
            clickhouse,
        }
    }

    /// Publish one batch. At-least-once: callers must assume duplicates
    /// across retries.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn publish(&self, events: &[Event]) -> Result<(), PublishError> {
        if events.is_empty() {
            return Ok(());
        }

        if let Some(clickhouse) = &self.clickhouse {
            clickhouse.insert_events(events).await?;
            debug!(count = events.len(), "published events to ClickHouse");
            return Ok(());
        }

        self.publish_to_vector(events).await
    }

    /// Publish in batches of `batch_size` (0 falls back to the default).
    pub async fn publish_batched(
        &self,
        events: &[Event],
        batch_size: usize,
    ) -> Result<(), PublishError> {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };

        for batch in events.chunks(batch_size) {
            self.publish(batch).await?;
        }
        Ok(())
    }

    async fn publish_to_vector(&self, events: &[Event]) -> Result<(), PublishError> {
        let mut ndjson = Vec::with_capacity(events.len() * 512);
        for event in events {
            match serde_json::to_vec(event) {
                Ok(line) => {
                    ndjson.extend_from_slice(&line);
                    ndjson.push(b'\n');
                }
                Err(error) => {
                    warn!(id = %event.id, %error, "failed to marshal event, skipping");
                }
            }
        }

        let url = format!("{}/events", self.vector_url);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self
                .http
                .post(&url)
                .header("Content-Type", "application/x-ndjson")
                .body(ndjson.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(count = events.len(), "published events to Vector");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    if attempts < VECTOR_RETRIES && matches!(status, 500..=599 | 429) {
                        warn!(attempt = attempts, status, "retrying Vector publish");
                        tokio::time::sleep(VECTOR_RETRY_GAP).await;
                        continue;
                    }
                    return Err(PublishError::Vector { status, body });
                }
                Err(error) if attempts < VECTOR_RETRIES => {
                    warn!(attempt = attempts, %error, "retrying Vector publish");
                    tokio::time::sleep(VECTOR_RETRY_GAP).await;
                }
                Err(error) => return Err(PublishError::Http(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{EventType, Provider, Severity};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(id: &str) -> Event {
        Event::new(
            id,
            "t-1",
            "int-1",
            "s1",
            Provider::SentinelOne,
            "2024-07-01T10:00:00Z".parse().unwrap(),
            Severity::Info,
            EventType::Activity,
            "login",
            "",
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn falls_back_to_vector_as_ndjson() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events"))
            .and(header("Content-Type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = Publisher::new(server.uri(), None);
        publisher
            .publish(&[event("a"), event("b")])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert_eq!(body.lines().count(), 2);
        for line in body.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["tenant_id"], "t-1");
        }
    }

    #[tokio::test]
    async fn splits_into_batches() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let publisher = Publisher::new(server.uri(), None);
        let events: Vec<Event> = (0..5).map(|i| event(&format!("e{i}"))).collect();
        publisher.publish_batched(&events, 2).await.unwrap();
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let server = MockServer::start().await;
        // No mock mounted: any request would fail the test teardown.
        let publisher = Publisher::new(server.uri(), None);
        publisher.publish(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn surfaces_vector_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let publisher = Publisher::new(server.uri(), None);
        let err = publisher.publish(&[event("a")]).await.unwrap_err();
        assert!(matches!(err, PublishError::Vector { status: 400, .. }));
    }
}

//! Durable checkpoint state, keyed by `(tenant, provider, url_hash)`.
//!
//! The control plane is authoritative; the in-process cache only coalesces
//! repeated reads within one collector. A missing state (404 or a null
//! body) is reported as `None` and deliberately not cached, so state created
//! out-of-band becomes visible on the next read.

use std::collections::HashMap;
use std::time::Duration;

use argus_core::Provider;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::COLLECTOR_KEY_HEADER;
use crate::error::ControlError;

/// Checkpoint state for one `(tenant, provider, url_hash)` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub checkpoint: Option<DateTime<Utc>>,
    #[serde(default)]
    pub full_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub full_sync_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    tenant_id: String,
    provider: Provider,
    url_hash: String,
}

/// REST-backed checkpoint store with a per-key read-through cache.
#[derive(Debug)]
pub struct StateStore {
    base_url: String,
    collector_key: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<StateKey, SyncState>>,
}

impl StateStore {
    /// Create a store against the control-plane base URL.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialised.
    #[must_use]
    pub fn new(base_url: impl Into<String>, collector_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");

        Self {
            base_url: base_url.into(),
            collector_key: collector_key.into(),
            http,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the state for a key, serving repeated reads from cache.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
    ) -> Result<Option<SyncState>, ControlError> {
        let key = StateKey {
            tenant_id: tenant_id.to_string(),
            provider,
            url_hash: url_hash.to_string(),
        };

        if let Some(cached) = self.cache.read().get(&key) {
            return Ok(Some(cached.clone()));
        }

        let response = self
            .http
            .get(format!("{}/integrations/collector/state", self.base_url))
            .header(COLLECTOR_KEY_HEADER, &self.collector_key)
            .query(&[
                ("tenantId", tenant_id),
                ("provider", provider.as_str()),
                ("urlHash", url_hash),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ControlError::Api {
                status: status.as_u16(),
            });
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            state: Option<SyncState>,
        }

        let envelope: Envelope = response.json().await?;
        if let Some(state) = &envelope.state {
            self.cache.write().insert(key, state.clone());
        }
        Ok(envelope.state)
    }

    /// Last checkpoint for a key, if any.
    pub async fn checkpoint(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
    ) -> Option<DateTime<Utc>> {
        match self.get(tenant_id, provider, url_hash).await {
            Ok(state) => state.and_then(|s| s.checkpoint),
            Err(error) => {
                debug!(%error, "checkpoint read failed, treating as absent");
                None
            }
        }
    }

    /// Whether the initial backfill has ever completed for this key.
    pub async fn has_full_sync(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
    ) -> bool {
        match self.get(tenant_id, provider, url_hash).await {
            Ok(state) => state.is_some_and(|s| s.full_sync_complete),
            Err(_) => false,
        }
    }

    /// Advance the checkpoint for a key.
    ///
    /// The stored value is `max(current, ts)`, so a late or replayed write
    /// can never move the checkpoint backwards, and the latch flag already
    /// recorded upstream is echoed back rather than reset.
    #[instrument(skip(self))]
    pub async fn set_checkpoint(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), ControlError> {
        let current = self.get(tenant_id, provider, url_hash).await?;
        let full_sync_complete = current.as_ref().is_some_and(|s| s.full_sync_complete);
        let effective = match current.and_then(|s| s.checkpoint) {
            Some(existing) => existing.max(ts),
            None => ts,
        };

        self.write_state(tenant_id, provider, url_hash, Some(effective), full_sync_complete)
            .await
    }

    /// Latch the full-sync flag for a key. One-way: the flag is never
    /// written back to false once set.
    #[instrument(skip(self))]
    pub async fn mark_full_sync(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
    ) -> Result<(), ControlError> {
        self.write_state(tenant_id, provider, url_hash, Some(Utc::now()), true)
            .await
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    async fn write_state(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
        checkpoint: Option<DateTime<Utc>>,
        full_sync_complete: bool,
    ) -> Result<(), ControlError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            tenant_id: &'a str,
            provider: &'a str,
            url_hash: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            checkpoint: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            full_sync_at: Option<String>,
            full_sync_complete: bool,
        }

        let full_sync_at = full_sync_complete.then(|| Utc::now().to_rfc3339());
        let response = self
            .http
            .post(format!("{}/integrations/collector/state", self.base_url))
            .header(COLLECTOR_KEY_HEADER, &self.collector_key)
            .json(&Body {
                tenant_id,
                provider: provider.as_str(),
                url_hash,
                checkpoint: checkpoint.map(|c| c.to_rfc3339()),
                full_sync_at,
                full_sync_complete,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Api {
                status: status.as_u16(),
            });
        }

        self.cache.write().remove(&StateKey {
            tenant_id: tenant_id.to_string(),
            provider,
            url_hash: url_hash.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_body(checkpoint: &str, complete: bool) -> serde_json::Value {
        serde_json::json!({
            "state": {
                "id": "st-1",
                "tenantId": "t-1",
                "provider": "sentinelone",
                "urlHash": "abc",
                "checkpoint": checkpoint,
                "fullSyncAt": null,
                "fullSyncComplete": complete
            }
        })
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .and(query_param("urlHash", "abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(state_body("2024-07-01T10:00:00Z", true)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        for _ in 0..2 {
            let state = store
                .get("t-1", Provider::SentinelOne, "abc")
                .await
                .unwrap()
                .unwrap();
            assert!(state.full_sync_complete);
        }
    }

    #[tokio::test]
    async fn missing_state_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(state_body("2024-07-01T10:00:00Z", false)),
            )
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        assert!(store
            .get("t-1", Provider::SentinelOne, "abc")
            .await
            .unwrap()
            .is_none());
        // State created out-of-band between the two reads is visible.
        assert!(store
            .get("t-1", Provider::SentinelOne, "abc")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn clear_cache_forces_a_fresh_read() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(state_body("2024-07-01T10:00:00Z", true)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        store.get("t-1", Provider::SentinelOne, "abc").await.unwrap();
        store.clear_cache();
        store.get("t-1", Provider::SentinelOne, "abc").await.unwrap();
    }

    #[tokio::test]
    async fn null_state_body_means_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": null
            })))
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        assert!(store
            .get("t-1", Provider::CrowdStrike, "abc")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_checkpoint_clamps_to_stored_maximum() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(state_body("2024-07-02T00:00:00Z", true)),
            )
            .mount(&server)
            .await;
        // The POST must carry the newer stored checkpoint and preserve the
        // latch even though the caller passed an older timestamp.
        Mock::given(method("POST"))
            .and(path("/integrations/collector/state"))
            .and(body_partial_json(serde_json::json!({
                "tenantId": "t-1",
                "provider": "sentinelone",
                "urlHash": "abc",
                "checkpoint": "2024-07-02T00:00:00+00:00",
                "fullSyncComplete": true
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        let stale = "2024-07-01T00:00:00Z".parse().unwrap();
        store
            .set_checkpoint("t-1", Provider::SentinelOne, "abc", stale)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_invalidates_cache() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(state_body("2024-07-01T00:00:00Z", false)),
            )
            .expect(2) // initial read (set_checkpoint reads the cache), read after invalidation
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/integrations/collector/state"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = StateStore::new(server.uri(), "secret");
        store.get("t-1", Provider::SentinelOne, "abc").await.unwrap();
        store
            .set_checkpoint(
                "t-1",
                Provider::SentinelOne,
                "abc",
                "2024-07-03T00:00:00Z".parse().unwrap(),
            )
            .await
            .unwrap();
        store.get("t-1", Provider::SentinelOne, "abc").await.unwrap();
    }
}

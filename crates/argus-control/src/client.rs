//! Integration listing and sync-status reporting.

use std::time::Duration;

use argus_core::Provider;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ControlError;

/// Header carrying the shared collector secret.
pub(crate) const COLLECTOR_KEY_HEADER: &str = "X-Collector-Key";

/// Outcome of the last sync, as recorded on the integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

/// A configured credential + endpoint binding a tenant to a vendor tenant.
///
/// Read from the control plane, never mutated locally. `config` is the
/// decrypted credential blob as a JSON string; each connector parses its own
/// shape out of it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    pub provider: String,
    pub config: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_sync_at: Option<String>,
    #[serde(default = "default_sync_status")]
    pub last_sync_status: SyncStatus,
}

const fn default_sync_status() -> SyncStatus {
    SyncStatus::Pending
}

impl Integration {
    /// Display name, falling back to `{provider}-{id prefix}` when the
    /// control plane sends an empty name.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            let prefix = &self.id[..self.id.len().min(8)];
            format!("{}-{prefix}", self.provider)
        } else {
            self.name.clone()
        }
    }
}

/// Control-plane REST client.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    base_url: String,
    collector_key: String,
    http: reqwest::Client,
}

impl ControlPlane {
    /// Create a client against the given control-plane base URL.
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
        }
    }

    /// Fetch all integrations of one vendor.
    #[instrument(skip(self))]
    pub async fn fetch_integrations(
        &self,
        provider: Provider,
    ) -> Result<Vec<Integration>, ControlError> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            integrations: Vec<Integration>,
        }

        let response = self
            .http
            .get(format!("{}/integrations/collector", self.base_url))
            .header(COLLECTOR_KEY_HEADER, &self.collector_key)
            .query(&[("type", provider.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Api {
                status: status.as_u16(),
            });
        }

        let envelope: Envelope = response.json().await?;
        debug!(
            provider = %provider,
            count = envelope.integrations.len(),
            "fetched integrations"
        );
        Ok(envelope.integrations)
    }

    /// Record the outcome of a sync run on the integration.
    #[instrument(skip(self, error))]
    pub async fn update_sync_status(
        &self,
        tenant_id: &str,
        provider: Provider,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), ControlError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            tenant_id: &'a str,
            provider: &'a str,
            status: SyncStatus,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
        }

        let response = self
            .http
            .post(format!("{}/integrations/collector/sync-status", self.base_url))
            .header(COLLECTOR_KEY_HEADER, &self.collector_key)
            .json(&Body {
                tenant_id,
                provider: provider.as_str(),
                status,
                error,
            })
            .send()
            .await?;

        let code = response.status();
        if !code.is_success() {
            return Err(ControlError::Api {
                status: code.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_integrations_parses_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector"))
            .and(query_param("type", "sentinelone"))
            .and(header(COLLECTOR_KEY_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "integrations": [{
                    "id": "int-1234567890",
                    "tenantId": "t-1",
                    "name": "",
                    "type": "sentinelone",
                    "provider": "sentinelone",
                    "config": "{\"baseUrl\":\"https://x.sentinelone.net\"}",
                    "status": "active",
                    "lastSyncAt": null,
                    "lastSyncStatus": "pending"
                }]
            })))
            .mount(&server)
            .await;

        let control = ControlPlane::new(server.uri(), "secret");
        let integrations = control
            .fetch_integrations(Provider::SentinelOne)
            .await
            .unwrap();

        assert_eq!(integrations.len(), 1);
        let integration = &integrations[0];
        assert_eq!(integration.tenant_id, "t-1");
        assert_eq!(integration.last_sync_status, SyncStatus::Pending);
        assert_eq!(integration.display_name(), "sentinelone-int-1234");
    }

    #[tokio::test]
    async fn fetch_integrations_surfaces_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/integrations/collector"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let control = ControlPlane::new(server.uri(), "secret");
        let err = control
            .fetch_integrations(Provider::CrowdStrike)
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::Api { status: 503 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn sync_status_posts_error_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/integrations/collector/sync-status"))
            .and(header(COLLECTOR_KEY_HEADER, "secret"))
            .and(body_json(serde_json::json!({
                "tenantId": "t-1",
                "provider": "crowdstrike",
                "status": "error",
                "error": "query failed: status 500"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let control = ControlPlane::new(server.uri(), "secret");
        control
            .update_sync_status(
                "t-1",
                Provider::CrowdStrike,
                SyncStatus::Error,
                Some("query failed: status 500"),
            )
            .await
            .unwrap();
    }

    #[test]
    fn unknown_sync_status_does_not_fail_parsing() {
        let integration: Integration = serde_json::from_value(serde_json::json!({
            "id": "i",
            "tenantId": "t",
            "provider": "sentinelone",
            "config": "{}",
            "lastSyncStatus": "paused"
        }))
        .unwrap();
        assert_eq!(integration.last_sync_status, SyncStatus::Unknown);
    }
}

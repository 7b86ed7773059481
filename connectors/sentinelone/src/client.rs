//! SentinelOne API client.

use std::time::Duration;

use argus_core::{url_fingerprint, Event, EventType, Provider, Severity, SyncSink, URL_HASH_KEY};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::SentinelOneConfig;
use crate::error::SentinelOneError;
use crate::types::{Activity, CloudAlert, Paged, Threat};

const THREATS_PATH: &str = "/web/api/v2.1/threats";
const ACTIVITIES_PATH: &str = "/web/api/v2.1/activities";
const ALERTS_PATH: &str = "/web/api/v2.1/cloud-detection/alerts";

const PAGE_LIMIT: usize = 1000;
const PAGE_DELAY: Duration = Duration::from_millis(50);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_GAP: Duration = Duration::from_secs(5);

/// Wire format for time filters: millisecond-precision UTC.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// SentinelOne management API client, bound to one integration.
#[derive(Debug)]
pub struct SentinelOneClient {
    base_url: String,
    api_token: String,
    tenant_id: String,
    integration_id: String,
    integration_name: String,
    http: reqwest::Client,
}

impl SentinelOneClient {
    /// Create a client for one integration.
    pub fn new(
        tenant_id: impl Into<String>,
        integration_id: impl Into<String>,
        integration_name: impl Into<String>,
        config: &SentinelOneConfig,
    ) -> Result<Self, SentinelOneError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            tenant_id: tenant_id.into(),
            integration_id: integration_id.into(),
            integration_name: integration_name.into(),
            http,
        })
    }

    /// Fingerprint of the vendor-side tenant this client talks to.
    #[must_use]
    pub fn url_hash(&self) -> String {
        url_fingerprint(&[&self.base_url])
    }

    /// Fetch threats in `[start, end)`, streaming each page to the sink.
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    pub async fn fetch_threats(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sink: &dyn SyncSink,
    ) -> Result<usize, SentinelOneError> {
        self.fetch_paginated(cancel, THREATS_PATH, Vec::new(), start, end, sink, |t| {
            self.transform_threat(t)
        })
        .await
    }

    /// Fetch activities in `[start, end)`. `activity_types` optionally
    /// narrows to specific vendor activity-type codes.
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    pub async fn fetch_activities(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        activity_types: &[i64],
        sink: &dyn SyncSink,
    ) -> Result<usize, SentinelOneError> {
        let mut extra = Vec::new();
        if !activity_types.is_empty() {
            let encoded =
                serde_json::to_string(activity_types).unwrap_or_else(|_| "[]".to_string());
            extra.push(("activityTypes".to_string(), encoded));
        }

        self.fetch_paginated(cancel, ACTIVITIES_PATH, extra, start, end, sink, |a| {
            self.transform_activity(a)
        })
        .await
    }

    /// Fetch cloud-detection alerts in `[start, end)`.
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    pub async fn fetch_alerts(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sink: &dyn SyncSink,
    ) -> Result<usize, SentinelOneError> {
        self.fetch_paginated(cancel, ALERTS_PATH, Vec::new(), start, end, sink, |a| {
            self.transform_alert(a)
        })
        .await
    }

    /// Cursor-pagination driver shared by every resource.
    ///
    /// Cancellation is checked before each request and again between
    /// transformation and publishing; the in-flight page is discarded when
    /// the scope trips in between. Pages never accumulate: each one goes to
    /// the sink before the next request is issued.
    async fn fetch_paginated<T, F>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        extra_params: Vec<(String, String)>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sink: &dyn SyncSink,
        transform: F,
    ) -> Result<usize, SentinelOneError>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Event,
    {
        info!(
            path,
            from = %start,
            to = %end,
            "fetching with cursor pagination"
        );

        let mut fetched = 0usize;
        let mut cursor: Option<String> = None;
        let mut page = 1u32;

        loop {
            if cancel.is_cancelled() {
                warn!(
                    integration_id = %self.integration_id,
                    fetched,
                    "cancelled, stopping fetch"
                );
                return Err(SentinelOneError::Cancelled { fetched });
            }

            let mut params: Vec<(String, String)> = vec![
                ("limit".into(), PAGE_LIMIT.to_string()),
                ("sortBy".into(), "createdAt".into()),
                ("sortOrder".into(), "desc".into()),
                (
                    "createdAt__gte".into(),
                    start.format(TIME_FORMAT).to_string(),
                ),
                ("createdAt__lt".into(), end.format(TIME_FORMAT).to_string()),
            ];
            params.extend(extra_params.iter().cloned());
            if let Some(cursor) = &cursor {
                params.push(("cursor".into(), cursor.clone()));
            }

            debug!(page, has_cursor = cursor.is_some(), "fetching page");
            let result: Paged<T> = match self.get_with_retry(path, &params, cancel).await {
                Ok(result) => result,
                Err(error) if error.is_cancelled() => {
                    return Err(SentinelOneError::Cancelled { fetched });
                }
                Err(error) => return Err(error),
            };

            let page_count = result.data.len();
            if page_count > 0 {
                let events: Vec<Event> = result.data.into_iter().map(&transform).collect();

                if cancel.is_cancelled() {
                    warn!(
                        integration_id = %self.integration_id,
                        fetched,
                        "cancelled before publish, discarding in-flight page"
                    );
                    return Err(SentinelOneError::Cancelled { fetched });
                }

                if let Err(error) = sink.publish_page(events).await {
                    warn!(%error, "failed to publish page");
                }
                fetched += page_count;
            }

            info!(page, page_count, fetched, "fetched page");
            if page == 1 && result.pagination.total_items > 0 {
                info!(total_items = result.pagination.total_items, "vendor reports total");
            }

            match result.pagination.next_cursor {
                Some(next) if !next.is_empty() && page_count > 0 => cursor = Some(next),
                _ => {
                    info!("pagination complete");
                    break;
                }
            }
            page += 1;

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(SentinelOneError::Cancelled { fetched });
                }
                () = tokio::time::sleep(PAGE_DELAY) => {}
            }
        }

        info!(fetched, path, "fetch complete");
        sink.advance_checkpoint(end).await;
        Ok(fetched)
    }

    /// One GET with bounded retry. Transient transport errors, 5xx, 429 and
    /// malformed bodies retry up to [`MAX_ATTEMPTS`] with a fixed gap; the
    /// request is raced against the cancel scope throughout.
    async fn get_with_retry<T>(
        &self,
        path: &str,
        params: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<T, SentinelOneError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let send = self
                .http
                .get(&url)
                .header("Authorization", format!("ApiToken {}", self.api_token))
                .query(params)
                .send();

            let result = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(SentinelOneError::Cancelled { fetched: 0 });
                }
                result = send => result,
            };

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.bytes().await.unwrap_or_default();

                    if status.is_success() {
                        match serde_json::from_slice::<T>(&body) {
                            Ok(parsed) => return Ok(parsed),
                            Err(e) => SentinelOneError::Malformed {
                                message: e.to_string(),
                                snippet: snippet(&body),
                            },
                        }
                    } else {
                        SentinelOneError::Api {
                            status: status.as_u16(),
                            body: snippet(&body),
                        }
                    }
                }
                Err(e) => SentinelOneError::Http(e),
            };

            if attempts >= MAX_ATTEMPTS || !error.is_retryable() {
                return Err(error);
            }
            warn!(attempt = attempts, %error, "retrying SentinelOne request");
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(SentinelOneError::Cancelled { fetched: 0 });
                }
                () = tokio::time::sleep(RETRY_GAP) => {}
            }
        }
    }

    fn transform_threat(&self, threat: Threat) -> Event {
        let timestamp = parse_timestamp(&threat.threat_info.created_at);
        let (tactic, technique) = threat
            .threat_info
            .indicators
            .first()
            .map(|indicator| {
                (
                    indicator.tactics.first().cloned(),
                    indicator.techniques.first().cloned(),
                )
            })
            .unwrap_or_default();

        let info = &threat.threat_info;
        let mut event = Event::new(
            threat.id.clone(),
            &self.tenant_id,
            &self.integration_id,
            &self.integration_name,
            Provider::SentinelOne,
            timestamp,
            Severity::from_confidence_level(&info.confidence_level),
            EventType::Threat,
            &info.threat_name,
            format!("{} - {}", info.classification, info.mitigation_status),
            self.raw_payload(&threat),
        );

        event.threat_name = non_empty(&info.threat_name);
        event.classification = non_empty(&info.classification);
        event.confidence_level = non_empty(&info.confidence_level);
        event.mitre_tactic = tactic;
        event.mitre_technique = technique;
        event.host = argus_core::HostInfo {
            name: non_empty(&threat.agent_realtime_info.agent_computer_name),
            ip: non_empty(&threat.agent_detection_info.agent_ip_v4),
            external_ip: non_empty(&threat.agent_detection_info.external_ip),
            os: non_empty(&threat.agent_realtime_info.agent_os_name),
            agent_id: non_empty(&threat.agent_realtime_info.agent_id),
            agent_version: non_empty(&threat.agent_detection_info.agent_version),
            account_id: non_empty(&threat.agent_detection_info.account_id),
            account_name: non_empty(&threat.agent_detection_info.account_name),
            site_id: non_empty(&threat.agent_detection_info.site_id),
            site_name: non_empty(&threat.agent_detection_info.site_name),
            group_id: non_empty(&threat.agent_detection_info.group_id),
            group_name: non_empty(&threat.agent_detection_info.group_name),
            domain: non_empty(&threat.agent_detection_info.agent_domain),
            ..Default::default()
        };
        event.user.name = non_empty(&info.process_user);
        event.file.path = non_empty(&info.file_path);
        event.file.sha256 = non_empty(&info.sha256);
        event
            .metadata
            .insert("mitigationStatus".into(), info.mitigation_status.clone());
        event
            .metadata
            .insert("analystVerdict".into(), info.analyst_verdict.clone());
        event
            .metadata
            .insert("initiatedBy".into(), info.initiated_by.clone());
        event
    }

    fn transform_activity(&self, activity: Activity) -> Event {
        let timestamp = parse_timestamp(&activity.created_at);

        let mut event = Event::new(
            activity.id.clone(),
            &self.tenant_id,
            &self.integration_id,
            &self.integration_name,
            Provider::SentinelOne,
            timestamp,
            Severity::Info,
            EventType::Activity,
            &activity.primary_description,
            &activity.secondary_description,
            self.raw_payload(&activity),
        );

        event.host = argus_core::HostInfo {
            name: non_empty(&activity.computer_name),
            account_name: non_empty(&activity.account_name),
            site_name: non_empty(&activity.site_name),
            group_name: non_empty(&activity.group_name),
            agent_id: non_empty(&activity.agent_id),
            ..Default::default()
        };
        event
            .metadata
            .insert("activityType".into(), activity.activity_type.to_string());
        event
            .metadata
            .insert("accountName".into(), activity.account_name.clone());
        event
    }

    fn transform_alert(&self, alert: CloudAlert) -> Event {
        let timestamp = parse_timestamp(&alert.alert_info.created_at);

        let mut event = Event::new(
            alert.alert_info.alert_id.clone(),
            &self.tenant_id,
            &self.integration_id,
            &self.integration_name,
            Provider::SentinelOne,
            timestamp,
            Severity::from_rule_severity(&alert.rule_info.severity),
            EventType::Alert,
            &alert.rule_info.name,
            &alert.rule_info.description,
            self.raw_payload(&alert),
        );

        event.rule_name = non_empty(&alert.rule_info.name);
        event.incident_status = non_empty(&alert.alert_info.incident_status);
        event.host = argus_core::HostInfo {
            name: non_empty(&alert.agent_detection_info.name),
            os: non_empty(&alert.agent_detection_info.os_type),
            agent_id: non_empty(&alert.agent_detection_info.uuid),
            site_id: non_empty(&alert.agent_detection_info.site_id),
            platform: non_empty(&alert.agent_detection_info.machine_type),
            ..Default::default()
        };
        event.user.name = non_empty(&alert.source_process_info.user);
        event.process = argus_core::ProcessInfo {
            name: non_empty(&alert.source_process_info.name),
            path: non_empty(&alert.source_process_info.file_path),
            command_line: non_empty(&alert.source_process_info.commandline),
            pid: alert.source_process_info.pid.parse().ok(),
            md5: non_empty(&alert.source_process_info.file_hash_md5),
            sha256: non_empty(&alert.source_process_info.file_hash_sha256),
            ..Default::default()
        };
        event.parent_process = argus_core::ParentProcessInfo {
            name: non_empty(&alert.source_parent_process_info.name),
            path: non_empty(&alert.source_parent_process_info.file_path),
            command_line: non_empty(&alert.source_parent_process_info.commandline),
            sha256: non_empty(&alert.source_parent_process_info.file_hash_sha256),
            md5: non_empty(&alert.source_parent_process_info.file_hash_md5),
            user_name: non_empty(&alert.source_parent_process_info.user),
        };
        event
            .metadata
            .insert("analystVerdict".into(), alert.alert_info.analyst_verdict.clone());
        event
            .metadata
            .insert("hitType".into(), alert.alert_info.hit_type.clone());
        event.metadata.insert(
            "treatAsThreat".into(),
            alert.rule_info.treat_as_threat.to_string(),
        );
        event
    }

    /// Serialize the full vendor payload and stamp the URL fingerprint in.
    fn raw_payload<T: Serialize>(&self, payload: &T) -> serde_json::Value {
        let mut raw = serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(map) = raw.as_object_mut() {
            map.insert(
                URL_HASH_KEY.to_string(),
                serde_json::Value::String(self.url_hash()),
            );
        }
        raw
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parse a vendor timestamp, falling back to the epoch so a malformed field
/// never drops the event.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn snippet(body: &[u8]) -> String {
    const MAX: usize = 256;
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX).collect()
}

//! CrowdStrike Falcon API client.

use std::time::Duration;

use argus_core::{url_fingerprint, Event, EventType, Provider, Severity, SyncSink, URL_HASH_KEY};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::CrowdStrikeConfig;
use crate::error::CrowdStrikeError;
use crate::types::{
    Alert, DetailResponse, Incident, PatternDisposition, QueryResponse, TokenResponse,
};

const ALERT_QUERY_PATH: &str = "/alerts/queries/alerts/v2";
const ALERT_DETAIL_PATH: &str = "/alerts/entities/alerts/v2";
const INCIDENT_QUERY_PATH: &str = "/incidents/queries/incidents/v1";
const INCIDENT_DETAIL_PATH: &str = "/incidents/entities/incidents/GET/v1";
const TOKEN_PATH: &str = "/oauth2/token";

const QUERY_LIMIT: usize = 500;
/// Vendor-imposed maximum offset; listing stops here and the remainder is
/// absorbed by a future tick's window.
const MAX_OFFSET: usize = 10_000;
/// Maximum ids per entity-detail call.
const DETAIL_BATCH: usize = 100;
const PAGE_DELAY: Duration = Duration::from_millis(50);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_GAP: Duration = Duration::from_secs(5);
/// Tokens are refreshed this many seconds before the server-reported expiry.
const TOKEN_MARGIN_SECS: i64 = 60;

/// The two offset-paginated resources.
#[derive(Debug, Clone, Copy)]
enum OffsetResource {
    Alerts,
    Incidents,
}

impl OffsetResource {
    const fn query_path(self) -> &'static str {
        match self {
            Self::Alerts => ALERT_QUERY_PATH,
            Self::Incidents => INCIDENT_QUERY_PATH,
        }
    }

    const fn sort(self) -> &'static str {
        match self {
            Self::Alerts => "created_timestamp|desc",
            Self::Incidents => "start.desc",
        }
    }
}

#[derive(Debug, Clone)]
struct BearerToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// CrowdStrike Falcon API client, bound to one integration.
#[derive(Debug)]
pub struct CrowdStrikeClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    tenant_id: String,
    integration_id: String,
    integration_name: String,
    http: reqwest::Client,
    // Single-writer token refresh: concurrent fetches serialize here.
    token: Mutex<Option<BearerToken>>,
}

impl CrowdStrikeClient {
    /// Create a client for one integration.
    pub fn new(
        tenant_id: impl Into<String>,
        integration_id: impl Into<String>,
        integration_name: impl Into<String>,
        config: &CrowdStrikeConfig,
    ) -> Result<Self, CrowdStrikeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tenant_id: tenant_id.into(),
            integration_id: integration_id.into(),
            integration_name: integration_name.into(),
            http,
            token: Mutex::new(None),
        })
    }

    /// Fingerprint of the vendor-side tenant. Base URL plus client id: one
    /// Falcon cloud URL hosts many API clients.
    #[must_use]
    pub fn url_hash(&self) -> String {
        url_fingerprint(&[&self.base_url, &self.client_id])
    }

    /// Fetch alerts in `[start, end)`, streaming each page to the sink.
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    pub async fn fetch_alerts(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sink: &dyn SyncSink,
    ) -> Result<usize, CrowdStrikeError> {
        let filter = format!(
            "created_timestamp:>='{}'+created_timestamp:<'{}'",
            rfc3339(start),
            rfc3339(end)
        );

        self.fetch_offset_paginated(cancel, OffsetResource::Alerts, &filter, sink, end)
            .await
    }

    /// Fetch incidents in `[start, end)`, streaming each page to the sink.
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    pub async fn fetch_incidents(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sink: &dyn SyncSink,
    ) -> Result<usize, CrowdStrikeError> {
        let filter = format!("start:>='{}'+start:<'{}'", rfc3339(start), rfc3339(end));

        self.fetch_offset_paginated(cancel, OffsetResource::Incidents, &filter, sink, end)
            .await
    }

    /// Offset-pagination driver shared by alerts and incidents.
    ///
    /// Phase one lists ids; phase two hydrates them in batches. Both phases
    /// run under the cancel scope; the in-flight page is discarded when the
    /// scope trips between transform and publish.
    async fn fetch_offset_paginated(
        &self,
        cancel: &CancellationToken,
        resource: OffsetResource,
        filter: &str,
        sink: &dyn SyncSink,
        window_end: DateTime<Utc>,
    ) -> Result<usize, CrowdStrikeError> {
        let query_path = resource.query_path();
        let sort = resource.sort();
        info!(query_path, filter, "fetching with offset pagination");

        let mut fetched = 0usize;
        let mut offset = 0usize;
        let mut page = 1u32;

        loop {
            if cancel.is_cancelled() {
                warn!(
                    integration_id = %self.integration_id,
                    fetched,
                    "cancelled, stopping fetch"
                );
                return Err(CrowdStrikeError::Cancelled { fetched });
            }

            debug!(page, offset, "querying ids");
            let limit_param = QUERY_LIMIT.to_string();
            let offset_param = offset.to_string();
            let query: QueryResponse = match self
                .send_authorized(cancel, |token| {
                    self.http
                        .get(format!("{}{query_path}", self.base_url))
                        .bearer_auth(token)
                        .query(&[
                            ("filter", filter),
                            ("limit", limit_param.as_str()),
                            ("offset", offset_param.as_str()),
                            ("sort", sort),
                        ])
                })
                .await
            {
                Ok(query) => query,
                Err(error) if error.is_cancelled() => {
                    return Err(CrowdStrikeError::Cancelled { fetched });
                }
                Err(error) => return Err(error),
            };

            let page_count = query.resources.len();
            if page_count > 0 {
                match self.hydrate(cancel, resource, query.resources).await {
                    Ok(events) => {
                        if cancel.is_cancelled() {
                            warn!(
                                integration_id = %self.integration_id,
                                fetched,
                                "cancelled before publish, discarding in-flight page"
                            );
                            return Err(CrowdStrikeError::Cancelled { fetched });
                        }

                        let published = events.len();
                        if let Err(error) = sink.publish_page(events).await {
                            warn!(%error, "failed to publish page");
                        }
                        fetched += published;
                    }
                    Err(error) if error.is_cancelled() => {
                        return Err(CrowdStrikeError::Cancelled { fetched });
                    }
                    Err(error) => {
                        warn!(%error, "failed to hydrate page, skipping");
                    }
                }
            }

            info!(
                page,
                page_count,
                fetched,
                total = query.meta.pagination.total,
                "fetched ids page"
            );

            if page_count < QUERY_LIMIT {
                info!("pagination complete");
                break;
            }

            offset += QUERY_LIMIT;
            page += 1;

            if offset >= MAX_OFFSET {
                warn!(
                    max_offset = MAX_OFFSET,
                    "reached vendor offset cap, remainder deferred to a later window"
                );
                break;
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(CrowdStrikeError::Cancelled { fetched });
                }
                () = tokio::time::sleep(PAGE_DELAY) => {}
            }
        }

        info!(fetched, query_path, "fetch complete");
        sink.advance_checkpoint(window_end).await;
        Ok(fetched)
    }

    /// Run phase two for one page of ids and transform the results.
    async fn hydrate(
        &self,
        cancel: &CancellationToken,
        resource: OffsetResource,
        ids: Vec<String>,
    ) -> Result<Vec<Event>, CrowdStrikeError> {
        match resource {
            OffsetResource::Alerts => Ok(self
                .alert_details(cancel, ids)
                .await?
                .into_iter()
                .map(|alert| self.transform_alert(alert))
                .collect()),
            OffsetResource::Incidents => Ok(self
                .incident_details(cancel, ids)
                .await?
                .into_iter()
                .map(|incident| self.transform_incident(incident))
                .collect()),
        }
    }

    /// Hydrate alert ids, at most [`DETAIL_BATCH`] per call.
    async fn alert_details(
        &self,
        cancel: &CancellationToken,
        ids: Vec<String>,
    ) -> Result<Vec<Alert>, CrowdStrikeError> {
        let mut alerts = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(DETAIL_BATCH) {
            let body = serde_json::json!({ "composite_ids": chunk });
            let response: DetailResponse<Alert> = self
                .send_authorized(cancel, |token| {
                    self.http
                        .post(format!("{}{ALERT_DETAIL_PATH}", self.base_url))
                        .bearer_auth(token)
                        .json(&body)
                })
                .await?;
            alerts.extend(response.resources);
        }
        Ok(alerts)
    }

    /// Hydrate incident ids, at most [`DETAIL_BATCH`] per call.
    async fn incident_details(
        &self,
        cancel: &CancellationToken,
        ids: Vec<String>,
    ) -> Result<Vec<Incident>, CrowdStrikeError> {
        let mut incidents = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(DETAIL_BATCH) {
            let body = serde_json::json!({ "ids": chunk });
            let response: DetailResponse<Incident> = self
                .send_authorized(cancel, |token| {
                    self.http
                        .post(format!("{}{INCIDENT_DETAIL_PATH}", self.base_url))
                        .bearer_auth(token)
                        .json(&body)
                })
                .await?;
            incidents.extend(response.resources);
        }
        Ok(incidents)
    }

    /// Acquire or reuse the OAuth2 bearer token.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<String, CrowdStrikeError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        let send = self
            .http
            .post(format!("{}{TOKEN_PATH}", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(CrowdStrikeError::Cancelled { fetched: 0 });
            }
            result = send => result?,
        };

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        // The token grant answers 201, not 200.
        if status != reqwest::StatusCode::CREATED {
            return Err(CrowdStrikeError::Auth {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let grant: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| CrowdStrikeError::Malformed {
                message: e.to_string(),
                snippet: snippet(&body),
            })?;

        let expires_at =
            Utc::now() + chrono::Duration::seconds(grant.expires_in - TOKEN_MARGIN_SECS);
        debug!(%expires_at, "authenticated with CrowdStrike");

        let access_token = grant.access_token.clone();
        *guard = Some(BearerToken {
            access_token: grant.access_token,
            expires_at,
        });
        Ok(access_token)
    }

    /// One authorized request with bounded retry.
    ///
    /// A 401/403 forces a single token refresh and retry; transient
    /// transport errors, 5xx, 429 and malformed bodies retry up to
    /// [`MAX_ATTEMPTS`] with a fixed gap. Everything races the cancel scope.
    async fn send_authorized<T, F>(
        &self,
        cancel: &CancellationToken,
        make: F,
    ) -> Result<T, CrowdStrikeError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let mut attempts = 0u32;
        let mut refreshed = false;

        loop {
            attempts += 1;
            let token = self.authenticate(cancel).await?;

            let result = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(CrowdStrikeError::Cancelled { fetched: 0 });
                }
                result = make(&token).send() => result,
            };

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.bytes().await.unwrap_or_default();

                    if status.is_success() {
                        match serde_json::from_slice::<T>(&body) {
                            Ok(parsed) => return Ok(parsed),
                            Err(e) => CrowdStrikeError::Malformed {
                                message: e.to_string(),
                                snippet: snippet(&body),
                            },
                        }
                    } else if matches!(status.as_u16(), 401 | 403) && !refreshed {
                        // Token may have been revoked server-side; refresh
                        // once and retry.
                        warn!(status = status.as_u16(), "unauthorized, forcing token refresh");
                        *self.token.lock().await = None;
                        refreshed = true;
                        continue;
                    } else if matches!(status.as_u16(), 401 | 403) {
                        return Err(CrowdStrikeError::Auth {
                            status: status.as_u16(),
                            body: snippet(&body),
                        });
                    } else {
                        CrowdStrikeError::Api {
                            status: status.as_u16(),
                            body: snippet(&body),
                        }
                    }
                }
                Err(e) => CrowdStrikeError::Http(e),
            };

            if attempts >= MAX_ATTEMPTS || !error.is_retryable() {
                return Err(error);
            }
            warn!(attempt = attempts, %error, "retrying CrowdStrike request");
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(CrowdStrikeError::Cancelled { fetched: 0 });
                }
                () = tokio::time::sleep(RETRY_GAP) => {}
            }
        }
    }

    fn transform_alert(&self, alert: Alert) -> Event {
        let timestamp = parse_timestamp(&alert.timestamp)
            .or_else(|| parse_timestamp(&alert.created_timestamp))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let disposition = &alert.pattern_disposition_details;
        let disposition_desc = if alert.pattern_disposition_description.is_empty() {
            disposition_description(disposition)
        } else {
            alert.pattern_disposition_description.clone()
        };
        let response_actions = response_actions(disposition);

        let host_ip = first_non_empty(&alert.local_ip, &alert.device.local_ip);
        let external_ip = first_non_empty(&alert.external_ip, &alert.device.external_ip);

        let mut event = Event::new(
            alert.composite_id.clone(),
            &self.tenant_id,
            &self.integration_id,
            &self.integration_name,
            Provider::CrowdStrike,
            timestamp,
            Severity::from_score(alert.severity),
            EventType::Alert,
            &alert.display_name,
            &alert.description,
            self.raw_payload(&alert),
        );

        event.rule_name = non_empty(&alert.scenario);
        event.threat_name = non_empty(&alert.name);
        event.classification = non_empty(&alert.objective);
        event.confidence_level = Some(alert.confidence.to_string());
        event.incident_status = non_empty(&alert.status);
        event.detection_engines = non_empty(&alert.product);
        event.mitre_tactic = non_empty(&alert.tactic);
        event.mitre_technique = non_empty(&alert.technique);

        event.threat_mitigated = disposition.kill_process || disposition.quarantine_file;
        event.disposition_description = Some(disposition_desc);
        event.response_actions = non_empty(&response_actions);

        event.console_link = non_empty(&alert.falcon_host_link);
        event.control_graph_id = non_empty(&alert.control_graph_id);

        event.host = argus_core::HostInfo {
            name: non_empty(&alert.hostname),
            ip: host_ip,
            external_ip: external_ip.clone(),
            mac_address: non_empty(&alert.device.mac_address),
            os: non_empty(&alert.platform),
            os_version: non_empty(&alert.device.os_version),
            platform: non_empty(&alert.device.platform_name),
            agent_id: non_empty(&alert.agent_id),
            agent_version: non_empty(&alert.device.agent_version),
            account_id: non_empty(&alert.cid),
            domain: non_empty(&alert.machine_domain),
            ..Default::default()
        };
        event.user = argus_core::UserInfo {
            name: non_empty(&alert.user_name),
            domain: non_empty(&alert.machine_domain),
            email: None,
        };
        event.process = argus_core::ProcessInfo {
            name: non_empty(&alert.filename),
            path: non_empty(&alert.filepath),
            command_line: non_empty(&alert.cmdline),
            md5: non_empty(&alert.md5),
            sha1: non_empty(&alert.sha1),
            sha256: non_empty(&alert.sha256),
            ..Default::default()
        };
        event.file = argus_core::FileInfo {
            name: non_empty(&alert.filename),
            path: non_empty(&alert.filepath),
            sha256: non_empty(&alert.sha256),
            md5: non_empty(&alert.md5),
            ..Default::default()
        };
        event.network.src_ip = external_ip;
        event.parent_process = process_chain_entry(&alert.parent_details);
        event.grandparent_process = process_chain_entry(&alert.grandparent_details);

        for (key, value) in [
            ("status", alert.status.clone()),
            ("cid", alert.cid.clone()),
            ("product", alert.product.clone()),
            ("scenario", alert.scenario.clone()),
            ("confidence", alert.confidence.to_string()),
            ("objective", alert.objective.clone()),
            ("resolution", alert.resolution.clone()),
            ("assignedToName", alert.assigned_to_name.clone()),
            ("displayName", alert.display_name.clone()),
            ("type", alert.r#type.clone()),
            ("patternId", alert.pattern_id.to_string()),
            ("patternDisposition", alert.pattern_disposition.to_string()),
            ("tacticId", alert.tactic_id.clone()),
            ("techniqueId", alert.technique_id.clone()),
            ("globalPrevalence", alert.global_prevalence.clone()),
            ("localPrevalence", alert.local_prevalence.clone()),
            ("priorityValue", alert.priority_value.to_string()),
            ("controlGraphId", alert.control_graph_id.clone()),
            ("eventCorrelationId", alert.event_correlation_id.clone()),
            ("falconHostLink", alert.falcon_host_link.clone()),
        ] {
            event.metadata.insert(key.into(), value);
        }

        event
    }

    fn transform_incident(&self, incident: Incident) -> Event {
        let timestamp =
            parse_timestamp(&incident.created).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let mut title = format!("Incident: {}", incident.tactics.join(", "));
        if !incident.techniques.is_empty() {
            title.push_str(&format!(" ({})", incident.techniques.join(", ")));
        }

        let description = if incident.description.is_empty() {
            format!(
                "State: {}, Hosts: {}, Users: {}, Objectives: {}",
                incident.state,
                incident.hosts.len(),
                incident.users.join(", "),
                incident.objectives.join(", ")
            )
        } else {
            incident.description.clone()
        };

        let mut event = Event::new(
            incident.incident_id.clone(),
            &self.tenant_id,
            &self.integration_id,
            &self.integration_name,
            Provider::CrowdStrike,
            timestamp,
            Severity::from_fine_score(incident.fine_score),
            EventType::Incident,
            title,
            description,
            self.raw_payload(&incident),
        );

        event.classification = non_empty(&incident.objectives.join(", "));
        event.confidence_level = Some(incident.fine_score.to_string());
        event.incident_status = Some(incident_status(&incident));
        event.mitre_tactic = incident.tactics.first().cloned();
        event.mitre_technique = incident.techniques.first().cloned();
        event.console_link = Some(format!(
            "https://falcon.crowdstrike.com/incidents/incident-details/{}",
            incident.incident_id
        ));
        event.incident_id = Some(incident.incident_id.clone());

        if let Some(host) = incident.hosts.first() {
            event.host = argus_core::HostInfo {
                name: non_empty(&host.hostname),
                ip: non_empty(&host.local_ip),
                external_ip: non_empty(&host.external_ip),
                mac_address: non_empty(&host.mac_address),
                os: non_empty(&host.os_version),
                platform: non_empty(&host.platform_name),
                agent_id: non_empty(&host.device_id),
                agent_version: non_empty(&host.agent_version),
                account_id: non_empty(&host.cid),
                site_name: non_empty(&host.site_name),
                group_name: non_empty(&host.groups.join(", ")),
                domain: non_empty(&host.machine_domain),
                ..Default::default()
            };
            event.network.src_ip = non_empty(&host.external_ip);
        }
        event.user.name = non_empty(&incident.users.join(", "));

        for (key, value) in [
            ("state", incident.state.clone()),
            ("status", incident.status.to_string()),
            ("fineScore", incident.fine_score.to_string()),
            ("hostCount", incident.hosts.len().to_string()),
            ("hostIds", incident.host_ids.join(",")),
            ("cid", incident.cid.clone()),
            ("assignedTo", incident.assigned_to_name.clone()),
            ("tactics", incident.tactics.join(",")),
            ("techniques", incident.techniques.join(",")),
            ("objectives", incident.objectives.join(",")),
        ] {
            event.metadata.insert(key.into(), value);
        }

        event
    }

    /// Serialize the full vendor payload and stamp the URL fingerprint in.
    fn raw_payload<T: serde::Serialize>(&self, payload: &T) -> serde_json::Value {
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

fn disposition_description(d: &PatternDisposition) -> String {
    let mut actions = Vec::new();
    if d.kill_process {
        actions.push("ProcessKilled");
    }
    if d.kill_parent {
        actions.push("ParentKilled");
    }
    if d.quarantine_file {
        actions.push("FileQuarantined");
    }
    if d.quarantine_machine {
        actions.push("MachineQuarantined");
    }
    if d.process_blocked {
        actions.push("ProcessBlocked");
    }
    if d.operation_blocked {
        actions.push("OperationBlocked");
    }
    if actions.is_empty() {
        "Detected".to_string()
    } else {
        actions.join(", ")
    }
}

fn response_actions(d: &PatternDisposition) -> String {
    let mut actions = Vec::new();
    if d.kill_process {
        actions.push("kill");
    }
    if d.quarantine_file {
        actions.push("quarantine");
    }
    if d.process_blocked {
        actions.push("block");
    }
    if d.suspend_process {
        actions.push("suspend");
    }
    actions.join(",")
}

fn incident_status(incident: &Incident) -> String {
    match incident.status {
        20 => "open".to_string(),
        25 => "reopened".to_string(),
        30 => "in_progress".to_string(),
        40 => "closed".to_string(),
        _ => incident.state.clone(),
    }
}

fn process_chain_entry(details: &crate::types::ProcessDetails) -> argus_core::ParentProcessInfo {
    argus_core::ParentProcessInfo {
        name: non_empty(&details.filename),
        path: non_empty(&details.filepath),
        command_line: non_empty(&details.cmdline),
        sha256: non_empty(&details.sha256),
        md5: non_empty(&details.md5),
        user_name: non_empty(&details.user_name),
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn first_non_empty(a: &str, b: &str) -> Option<String> {
    non_empty(a).or_else(|| non_empty(b))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn snippet(body: &[u8]) -> String {
    const MAX: usize = 256;
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX).collect()
}

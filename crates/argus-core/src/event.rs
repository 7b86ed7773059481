//! The canonical event schema shared by every vendor connector.
//!
//! Events are constructed in the connectors, published page-by-page and then
//! discarded; the downstream table deduplicates on `(tenant_id, source, id)`
//! at merge time, so connectors never need to track what was already sent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Provider, Severity};

/// Kind of security event, drawn from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Alert,
    Threat,
    Activity,
    Incident,
    Detection,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Threat => "threat",
            Self::Activity => "activity",
            Self::Incident => "incident",
            Self::Detection => "detection",
        }
    }
}

/// A normalised security event.
///
/// `raw` carries the complete original vendor payload, augmented with the
/// URL fingerprint under [`crate::URL_HASH_KEY`] so the completeness oracle
/// can scope its queries to one vendor-side tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub tenant_id: String,
    pub integration_id: String,
    pub integration_name: String,
    pub source: Provider,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub event_type: EventType,
    pub title: String,
    pub description: String,

    // Detection detail. Populated where the vendor provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_engines: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitre_tactic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitre_technique: Option<String>,

    /// Whether the vendor reports the threat as mitigated (killed,
    /// quarantined, blocked).
    #[serde(default)]
    pub threat_mitigated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_actions: Option<String>,

    /// Deep-link into the vendor console for this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_graph_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,

    #[serde(default)]
    pub host: HostInfo,
    #[serde(default)]
    pub user: UserInfo,
    #[serde(default)]
    pub process: ProcessInfo,
    #[serde(default)]
    pub file: FileInfo,
    #[serde(default)]
    pub network: NetworkInfo,
    #[serde(default)]
    pub parent_process: ParentProcessInfo,
    #[serde(default)]
    pub grandparent_process: ParentProcessInfo,

    /// Original vendor payload plus the URL fingerprint.
    pub raw: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub collected_at: DateTime<Utc>,
}

impl Event {
    /// Create an event with the required identity fields; detail fields
    /// start empty and are filled in by the vendor transform.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        integration_id: impl Into<String>,
        integration_name: impl Into<String>,
        source: Provider,
        timestamp: DateTime<Utc>,
        severity: Severity,
        event_type: EventType,
        title: impl Into<String>,
        description: impl Into<String>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            integration_id: integration_id.into(),
            integration_name: integration_name.into(),
            source,
            timestamp,
            severity,
            event_type,
            title: title.into(),
            description: description.into(),
            rule_name: None,
            threat_name: None,
            classification: None,
            confidence_level: None,
            incident_status: None,
            detection_engines: None,
            mitre_tactic: None,
            mitre_technique: None,
            threat_mitigated: false,
            disposition_description: None,
            response_actions: None,
            console_link: None,
            control_graph_id: None,
            incident_id: None,
            host: HostInfo::default(),
            user: UserInfo::default(),
            process: ProcessInfo::default(),
            file: FileInfo::default(),
            network: NetworkInfo::default(),
            parent_process: ParentProcessInfo::default(),
            grandparent_process: ParentProcessInfo::default(),
            raw,
            metadata: HashMap::new(),
            collected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_pid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_recv: Option<i64>,
}

/// One step of the ancestor process chain.
///
/// The chain is represented as flat parent / grandparent records rather than
/// a linked structure, so events stay self-contained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentProcessInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

//! CrowdStrike API response shapes.
//!
//! Every field defaults; the projections below never rely on an optional
//! subtree being present. The full payload survives in the event `raw`.

use serde::{Deserialize, Serialize};

/// OAuth2 token grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

/// Phase-one listing response: ids plus pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub meta: QueryMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryMeta {
    #[serde(default)]
    pub pagination: QueryPagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryPagination {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Phase-two entity response.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailResponse<T> {
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

// ── Alerts ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MitreAttack {
    #[serde(default)]
    pub pattern_id: i64,
    #[serde(default)]
    pub tactic: String,
    #[serde(default)]
    pub tactic_id: String,
    #[serde(default)]
    pub technique: String,
    #[serde(default)]
    pub technique_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessDetails {
    #[serde(default)]
    pub cmdline: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub local_process_id: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub process_graph_id: String,
    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub external_ip: String,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub machine_domain: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub platform_name: String,
    #[serde(default)]
    pub product_type_desc: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternDisposition {
    #[serde(default)]
    pub detect: bool,
    #[serde(default)]
    pub kill_process: bool,
    #[serde(default)]
    pub kill_parent: bool,
    #[serde(default)]
    pub kill_subprocess: bool,
    #[serde(default)]
    pub quarantine_file: bool,
    #[serde(default)]
    pub quarantine_machine: bool,
    #[serde(default)]
    pub process_blocked: bool,
    #[serde(default)]
    pub operation_blocked: bool,
    #[serde(default)]
    pub registry_operation_blocked: bool,
    #[serde(default)]
    pub fs_operation_blocked: bool,
    #[serde(default)]
    pub suspend_process: bool,
    #[serde(default)]
    pub suspend_parent: bool,
    #[serde(default)]
    pub response_action_triggered: bool,
    #[serde(default)]
    pub response_action_failed: bool,
}

/// An alert from the Alerts API v2.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub composite_id: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub aggregate_id: String,

    #[serde(default)]
    pub assigned_to_name: String,

    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub external_ip: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub machine_domain: String,
    #[serde(default)]
    pub device: DeviceInfo,

    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub severity: i64,
    #[serde(default)]
    pub severity_name: String,
    #[serde(default)]
    pub confidence: i64,

    #[serde(default)]
    pub context_timestamp: String,
    #[serde(default)]
    pub created_timestamp: String,
    #[serde(default)]
    pub updated_timestamp: String,
    #[serde(default)]
    pub timestamp: String,

    #[serde(default)]
    pub tactic: String,
    #[serde(default)]
    pub tactic_id: String,
    #[serde(default)]
    pub technique: String,
    #[serde(default)]
    pub technique_id: String,
    #[serde(default)]
    pub mitre_attack: Vec<MitreAttack>,

    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub cmdline: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub sha256: String,

    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub parent_process_id: String,
    #[serde(default)]
    pub parent_details: ProcessDetails,
    #[serde(default)]
    pub grandparent_details: ProcessDetails,

    #[serde(default)]
    pub pattern_id: i64,
    #[serde(default)]
    pub pattern_disposition: i64,
    #[serde(default)]
    pub pattern_disposition_description: String,
    #[serde(default)]
    pub pattern_disposition_details: PatternDisposition,

    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub scenario: String,

    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub global_prevalence: String,
    #[serde(default)]
    pub local_prevalence: String,
    #[serde(default)]
    pub priority_value: i64,

    #[serde(default)]
    pub control_graph_id: String,
    #[serde(default)]
    pub event_correlation_id: String,

    #[serde(default)]
    pub falcon_host_link: String,
    #[serde(default)]
    pub r#type: String,
}

// ── Incidents ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub incident_type: i64,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub host_ids: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<IncidentHost>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub fine_score: i64,
    #[serde(default)]
    pub assigned_to_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentHost {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub external_ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub machine_domain: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub platform_name: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_tolerates_sparse_payloads() {
        let alert: Alert =
            serde_json::from_str(r#"{"composite_id":"c-1","severity":85}"#).unwrap();
        assert_eq!(alert.composite_id, "c-1");
        assert_eq!(alert.severity, 85);
        assert!(alert.parent_details.filename.is_empty());
    }

    #[test]
    fn query_response_defaults() {
        let q: QueryResponse = serde_json::from_str("{}").unwrap();
        assert!(q.resources.is_empty());
        assert_eq!(q.meta.pagination.total, 0);
    }

    #[test]
    fn incident_parses_status_and_score() {
        let incident: Incident = serde_json::from_value(serde_json::json!({
            "incident_id": "inc:abc",
            "fine_score": 8,
            "status": 30,
            "tactics": ["Lateral Movement"],
            "hosts": [{"hostname": "DC-01", "local_ip": "10.0.0.2"}]
        }))
        .unwrap();
        assert_eq!(incident.fine_score, 8);
        assert_eq!(incident.hosts[0].hostname, "DC-01");
    }
}

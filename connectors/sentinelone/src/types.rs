//! SentinelOne API response shapes.
//!
//! Vendor payloads are polymorphic and sparsely populated, so every field
//! defaults: a missing subtree deserializes to its empty form instead of
//! failing the page. The full payload is preserved under the event's `raw`
//! regardless of what the projection picks out.

use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub total_items: i64,
}

// ── Threats ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub agent_detection_info: AgentDetectionInfo,
    #[serde(default)]
    pub agent_realtime_info: AgentRealtimeInfo,
    #[serde(default)]
    pub threat_info: ThreatInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetectionInfo {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub agent_domain: String,
    #[serde(default)]
    pub agent_ip_v4: String,
    #[serde(default)]
    pub agent_os_name: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub external_ip: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub site_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRealtimeInfo {
    #[serde(default)]
    pub agent_computer_name: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_os_type: String,
    #[serde(default)]
    pub agent_os_name: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub group_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatInfo {
    #[serde(default)]
    pub threat_id: String,
    #[serde(default)]
    pub threat_name: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub confidence_level: String,
    #[serde(default)]
    pub mitigation_status: String,
    #[serde(default)]
    pub analyst_verdict: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub initiated_by: String,
    #[serde(default)]
    pub originator_process: String,
    #[serde(default)]
    pub process_user: String,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
}

// ── Activities ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub activity_type: i64,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub computer_name: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub primary_description: String,
    #[serde(default)]
    pub secondary_description: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ── Cloud-detection alerts ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAlert {
    #[serde(default)]
    pub alert_info: AlertInfo,
    #[serde(default)]
    pub rule_info: RuleInfo,
    #[serde(default)]
    pub agent_detection_info: AlertAgentInfo,
    #[serde(default)]
    pub source_process_info: AlertProcessInfo,
    #[serde(default)]
    pub source_parent_process_info: AlertProcessInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    #[serde(default)]
    pub alert_id: String,
    #[serde(default)]
    pub analyst_verdict: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub incident_status: String,
    #[serde(default)]
    pub hit_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub dv_event_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub treat_as_threat: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertAgentInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub os_type: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub site_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProcessInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub commandline: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_hash_sha256: String,
    #[serde(default)]
    pub file_hash_md5: String,
    #[serde(default)]
    pub pid: String,
    #[serde(default)]
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_tolerates_missing_subtrees() {
        let threat: Threat = serde_json::from_str(r#"{"id":"t-1"}"#).unwrap();
        assert_eq!(threat.id, "t-1");
        assert!(threat.threat_info.indicators.is_empty());
    }

    #[test]
    fn page_without_pagination_block_is_terminal() {
        let page: Paged<Activity> = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(page.pagination.next_cursor.is_none());
    }

    #[test]
    fn alert_parses_rule_and_process_info() {
        let alert: CloudAlert = serde_json::from_value(serde_json::json!({
            "alertInfo": {"alertId": "a-1", "createdAt": "2024-07-01T00:00:00Z"},
            "ruleInfo": {"name": "Suspicious PowerShell", "severity": "High"},
            "sourceProcessInfo": {"name": "powershell.exe", "pid": "4242"}
        }))
        .unwrap();
        assert_eq!(alert.rule_info.severity, "High");
        assert_eq!(alert.source_process_info.pid, "4242");
    }
}

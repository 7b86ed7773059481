//! Flattened insert row for `security_events`.

use argus_core::Event;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;

/// One row of the `security_events` table.
///
/// Nested event objects are flattened into prefixed columns; `raw` and
/// `metadata` are stored as JSON strings so the original vendor payload
/// survives verbatim.
#[derive(Debug, Clone, Row, Serialize)]
pub struct EventRow {
    pub id: String,
    pub tenant_id: String,
    pub integration_id: String,
    pub integration_name: String,
    pub source: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub event_type: String,
    pub title: String,
    pub description: String,
    pub rule_name: String,
    pub threat_name: String,
    pub classification: String,
    pub confidence_level: String,
    pub incident_status: String,
    pub detection_engines: String,
    pub mitre_tactic: String,
    pub mitre_technique: String,
    pub threat_mitigated: bool,
    pub disposition_description: String,
    pub response_actions: String,
    pub console_link: String,
    pub control_graph_id: String,
    pub incident_id: String,
    pub host_name: String,
    pub host_ip: String,
    pub host_external_ip: String,
    pub host_mac_address: String,
    pub host_os: String,
    pub host_os_version: String,
    pub host_platform: String,
    pub host_agent_id: String,
    pub host_agent_version: String,
    pub host_account_id: String,
    pub host_account_name: String,
    pub host_site_id: String,
    pub host_site_name: String,
    pub host_group_id: String,
    pub host_group_name: String,
    pub host_domain: String,
    pub user_name: String,
    pub user_domain: String,
    pub user_email: String,
    pub process_name: String,
    pub process_path: String,
    pub process_cmd: String,
    pub process_pid: i64,
    pub process_ppid: i64,
    pub process_sha256: String,
    pub file_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub file_sha256: String,
    pub file_md5: String,
    pub file_size: i64,
    pub network_src_ip: String,
    pub network_dst_ip: String,
    pub network_src_port: i32,
    pub network_dst_port: i32,
    pub network_protocol: String,
    pub network_direction: String,
    pub network_bytes_sent: i64,
    pub network_bytes_recv: i64,
    pub parent_process_name: String,
    pub parent_process_cmd: String,
    pub parent_process_sha256: String,
    pub grandparent_process_name: String,
    pub grandparent_process_cmd: String,
    pub grandparent_process_sha256: String,
    pub raw: String,
    pub metadata: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub collected_at: DateTime<Utc>,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        let raw = serde_json::to_string(&event.raw).unwrap_or_else(|_| "{}".into());
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".into());

        Self {
            id: event.id.clone(),
            tenant_id: event.tenant_id.clone(),
            integration_id: event.integration_id.clone(),
            integration_name: event.integration_name.clone(),
            source: event.source.as_str().to_string(),
            timestamp: event.timestamp,
            severity: event.severity.as_str().to_string(),
            event_type: event.event_type.as_str().to_string(),
            title: event.title.clone(),
            description: event.description.clone(),
            rule_name: event.rule_name.clone().unwrap_or_default(),
            threat_name: event.threat_name.clone().unwrap_or_default(),
            classification: event.classification.clone().unwrap_or_default(),
            confidence_level: event.confidence_level.clone().unwrap_or_default(),
            incident_status: event.incident_status.clone().unwrap_or_default(),
            detection_engines: event.detection_engines.clone().unwrap_or_default(),
            mitre_tactic: event.mitre_tactic.clone().unwrap_or_default(),
            mitre_technique: event.mitre_technique.clone().unwrap_or_default(),
            threat_mitigated: event.threat_mitigated,
            disposition_description: event.disposition_description.clone().unwrap_or_default(),
            response_actions: event.response_actions.clone().unwrap_or_default(),
            console_link: event.console_link.clone().unwrap_or_default(),
            control_graph_id: event.control_graph_id.clone().unwrap_or_default(),
            incident_id: event.incident_id.clone().unwrap_or_default(),
            host_name: event.host.name.clone().unwrap_or_default(),
            host_ip: event.host.ip.clone().unwrap_or_default(),
            host_external_ip: event.host.external_ip.clone().unwrap_or_default(),
            host_mac_address: event.host.mac_address.clone().unwrap_or_default(),
            host_os: event.host.os.clone().unwrap_or_default(),
            host_os_version: event.host.os_version.clone().unwrap_or_default(),
            host_platform: event.host.platform.clone().unwrap_or_default(),
            host_agent_id: event.host.agent_id.clone().unwrap_or_default(),
            host_agent_version: event.host.agent_version.clone().unwrap_or_default(),
            host_account_id: event.host.account_id.clone().unwrap_or_default(),
            host_account_name: event.host.account_name.clone().unwrap_or_default(),
            host_site_id: event.host.site_id.clone().unwrap_or_default(),
            host_site_name: event.host.site_name.clone().unwrap_or_default(),
            host_group_id: event.host.group_id.clone().unwrap_or_default(),
            host_group_name: event.host.group_name.clone().unwrap_or_default(),
            host_domain: event.host.domain.clone().unwrap_or_default(),
            user_name: event.user.name.clone().unwrap_or_default(),
            user_domain: event.user.domain.clone().unwrap_or_default(),
            user_email: event.user.email.clone().unwrap_or_default(),
            process_name: event.process.name.clone().unwrap_or_default(),
            process_path: event.process.path.clone().unwrap_or_default(),
            process_cmd: event.process.command_line.clone().unwrap_or_default(),
            process_pid: event.process.pid.unwrap_or_default(),
            process_ppid: event.process.parent_pid.unwrap_or_default(),
            process_sha256: event.process.sha256.clone().unwrap_or_default(),
            file_name: event.file.name.clone().unwrap_or_default(),
            file_path: event.file.path.clone().unwrap_or_default(),
            file_hash: event.file.hash.clone().unwrap_or_default(),
            file_sha256: event.file.sha256.clone().unwrap_or_default(),
            file_md5: event.file.md5.clone().unwrap_or_default(),
            file_size: event.file.size.unwrap_or_default(),
            network_src_ip: event.network.src_ip.clone().unwrap_or_default(),
            network_dst_ip: event.network.dst_ip.clone().unwrap_or_default(),
            network_src_port: event.network.src_port.unwrap_or_default(),
            network_dst_port: event.network.dst_port.unwrap_or_default(),
            network_protocol: event.network.protocol.clone().unwrap_or_default(),
            network_direction: event.network.direction.clone().unwrap_or_default(),
            network_bytes_sent: event.network.bytes_sent.unwrap_or_default(),
            network_bytes_recv: event.network.bytes_recv.unwrap_or_default(),
            parent_process_name: event.parent_process.name.clone().unwrap_or_default(),
            parent_process_cmd: event.parent_process.command_line.clone().unwrap_or_default(),
            parent_process_sha256: event.parent_process.sha256.clone().unwrap_or_default(),
            grandparent_process_name: event.grandparent_process.name.clone().unwrap_or_default(),
            grandparent_process_cmd: event
                .grandparent_process
                .command_line
                .clone()
                .unwrap_or_default(),
            grandparent_process_sha256: event
                .grandparent_process
                .sha256
                .clone()
                .unwrap_or_default(),
            raw,
            metadata,
            collected_at: event.collected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{EventType, Provider, Severity, URL_HASH_KEY};

    fn sample_event() -> Event {
        let mut event = Event::new(
            "thr-1",
            "t-1",
            "int-1",
            "prod-s1",
            Provider::SentinelOne,
            "2024-07-01T10:00:00Z".parse().unwrap(),
            Severity::Critical,
            EventType::Threat,
            "Ransom.Win32",
            "Malware - mitigated",
            serde_json::json!({ URL_HASH_KEY: "7452c2087d561537af95e655eb9181b1" }),
        );
        event.threat_name = Some("Ransom.Win32".into());
        event.classification = Some("Malware".into());
        event.mitre_tactic = Some("Impact".into());
        event.mitre_technique = Some("T1486".into());
        event.threat_mitigated = true;
        event.host.name = Some("WS-01".into());
        event
    }

    #[test]
    fn flattens_event_fields() {
        let row = EventRow::from(&sample_event());
        assert_eq!(row.source, "sentinelone");
        assert_eq!(row.severity, "critical");
        assert_eq!(row.event_type, "threat");
        assert_eq!(row.host_name, "WS-01");
        assert_eq!(row.rule_name, "");
        assert!(row.threat_mitigated);
    }

    #[test]
    fn raw_keeps_url_hash() {
        let row = EventRow::from(&sample_event());
        let raw: serde_json::Value = serde_json::from_str(&row.raw).unwrap();
        assert_eq!(raw[URL_HASH_KEY], "7452c2087d561537af95e655eb9181b1");
    }
}

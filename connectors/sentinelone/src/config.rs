//! SentinelOne integration configuration.
//!
//! Parsed out of the decrypted credential blob the control plane stores on
//! the integration record.

use argus_core::FetchSetting;
use serde::Deserialize;

/// Default full-sync windows per resource, in days.
const THREATS_DAYS: i64 = 365;
const ACTIVITIES_DAYS: i64 = 120;
const ALERTS_DAYS: i64 = 365;

/// SentinelOne credentials and fetch tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentinelOneConfig {
    pub base_url: String,
    pub api_token: String,
    #[serde(default)]
    pub fetch_settings: FetchSettings,
}

impl SentinelOneConfig {
    /// Parse the decrypted integration config blob.
    pub fn parse(config: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(config)
    }
}

/// Per-resource fetch settings, with defaults where the user set nothing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSettings {
    #[serde(default)]
    pub threats: Option<FetchSetting>,
    #[serde(default)]
    pub activities: Option<FetchSetting>,
    #[serde(default)]
    pub alerts: Option<FetchSetting>,
}

impl FetchSettings {
    #[must_use]
    pub fn threats(&self) -> FetchSetting {
        self.threats
            .unwrap_or_else(|| FetchSetting::enabled_for(THREATS_DAYS))
    }

    #[must_use]
    pub fn activities(&self) -> FetchSetting {
        self.activities
            .unwrap_or_else(|| FetchSetting::enabled_for(ACTIVITIES_DAYS))
    }

    #[must_use]
    pub fn alerts(&self) -> FetchSetting {
        self.alerts
            .unwrap_or_else(|| FetchSetting::enabled_for(ALERTS_DAYS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = SentinelOneConfig::parse(
            r#"{"baseUrl":"https://x.sentinelone.net","apiToken":"tok"}"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://x.sentinelone.net");
        assert!(config.fetch_settings.threats().enabled);
        assert_eq!(config.fetch_settings.threats().days, 365);
        assert_eq!(config.fetch_settings.activities().days, 120);
        assert_eq!(config.fetch_settings.alerts().days, 365);
    }

    #[test]
    fn user_settings_override_defaults() {
        let config = SentinelOneConfig::parse(
            r#"{
                "baseUrl": "https://x.sentinelone.net",
                "apiToken": "tok",
                "fetchSettings": {
                    "threats": {"enabled": true, "days": 30},
                    "activities": {"enabled": false, "days": 0}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.fetch_settings.threats().days, 30);
        assert!(!config.fetch_settings.activities().enabled);
        // Alerts untouched by the user keep their default.
        assert!(config.fetch_settings.alerts().enabled);
    }

    #[test]
    fn rejects_garbage() {
        assert!(SentinelOneConfig::parse("not json").is_err());
    }
}

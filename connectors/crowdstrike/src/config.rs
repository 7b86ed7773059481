//! CrowdStrike integration configuration.

use argus_core::FetchSetting;
use serde::Deserialize;

const DEFAULT_DAYS: i64 = 365;

/// CrowdStrike API credentials and fetch tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdStrikeConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub fetch_settings: FetchSettings,
}

impl CrowdStrikeConfig {
    /// Parse the decrypted integration config blob.
    pub fn parse(config: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(config)
    }
}

/// Per-resource fetch settings.
///
/// `detections` is carried because the control plane sends it, but no
/// detection resource is fetched yet.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSettings {
    #[serde(default)]
    pub alerts: Option<FetchSetting>,
    #[serde(default)]
    pub detections: Option<FetchSetting>,
    #[serde(default)]
    pub incidents: Option<FetchSetting>,
}

impl FetchSettings {
    #[must_use]
    pub fn alerts(&self) -> FetchSetting {
        self.alerts
            .unwrap_or_else(|| FetchSetting::enabled_for(DEFAULT_DAYS))
    }

    #[must_use]
    pub fn incidents(&self) -> FetchSetting {
        self.incidents
            .unwrap_or_else(|| FetchSetting::enabled_for(DEFAULT_DAYS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credentials_and_defaults() {
        let config = CrowdStrikeConfig::parse(
            r#"{
                "baseUrl": "https://api.crowdstrike.com",
                "clientId": "abc123",
                "clientSecret": "shh"
            }"#,
        )
        .unwrap();

        assert_eq!(config.client_id, "abc123");
        assert_eq!(config.fetch_settings.alerts().days, 365);
        assert!(config.fetch_settings.incidents().enabled);
    }

    #[test]
    fn missing_credentials_fail() {
        assert!(CrowdStrikeConfig::parse(r#"{"baseUrl":"https://x"}"#).is_err());
    }
}

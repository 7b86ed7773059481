//! Per-resource fetch settings.

use serde::{Deserialize, Serialize};

/// User-tunable settings for one vendor resource.
///
/// `days` bounds the full-sync window for the resource; incremental syncs
/// always run from the last checkpoint regardless of `days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSetting {
    pub enabled: bool,
    pub days: i64,
}

impl FetchSetting {
    #[must_use]
    pub const fn enabled_for(days: i64) -> Self {
        Self {
            enabled: true,
            days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_integration_config() {
        let s: FetchSetting = serde_json::from_str(r#"{"enabled":false,"days":90}"#).unwrap();
        assert!(!s.enabled);
        assert_eq!(s.days, 90);
    }
}

//! Supported EDR vendors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported vendor. Closed set; also used as the event `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    SentinelOne,
    CrowdStrike,
}

impl Provider {
    pub const ALL: [Self; 2] = [Self::SentinelOne, Self::CrowdStrike];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SentinelOne => "sentinelone",
            Self::CrowdStrike => "crowdstrike",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentinelone" => Ok(Self::SentinelOne),
            "crowdstrike" => Ok(Self::CrowdStrike),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Returned when parsing a provider name that is not in the closed set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_as_str() {
        for p in Provider::ALL {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
        }
    }

    #[test]
    fn rejects_unknown() {
        assert!("defender".parse::<Provider>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&Provider::SentinelOne).unwrap(),
            "\"sentinelone\""
        );
    }
}

//! Severity normalisation.
//!
//! Every vendor scores differently; the canonical set is closed and anything
//! a vendor invents later lands on `info` rather than widening the set.

use serde::{Deserialize, Serialize};

/// Canonical severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    /// Map a CrowdStrike alert severity score (0-100).
    #[must_use]
    pub const fn from_score(score: i64) -> Self {
        match score {
            s if s >= 80 => Self::Critical,
            s if s >= 60 => Self::High,
            s if s >= 40 => Self::Medium,
            s if s >= 20 => Self::Low,
            _ => Self::Info,
        }
    }

    /// Map a CrowdStrike incident `fine_score` (0-10).
    #[must_use]
    pub const fn from_fine_score(score: i64) -> Self {
        match score {
            s if s >= 7 => Self::Critical,
            s if s >= 5 => Self::High,
            s if s >= 3 => Self::Medium,
            s if s >= 1 => Self::Low,
            _ => Self::Info,
        }
    }

    /// Map a SentinelOne threat `confidenceLevel`.
    #[must_use]
    pub fn from_confidence_level(level: &str) -> Self {
        match level {
            "malicious" => Self::Critical,
            "suspicious" => Self::High,
            "n/a" => Self::Medium,
            _ => Self::Info,
        }
    }

    /// Map a SentinelOne rule severity string ("Critical", "High", ...).
    ///
    /// Identity mapping onto the canonical set, case-insensitive.
    #[must_use]
    pub fn from_rule_severity(severity: &str) -> Self {
        match severity.to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_thresholds() {
        assert_eq!(Severity::from_score(100), Severity::Critical);
        assert_eq!(Severity::from_score(80), Severity::Critical);
        assert_eq!(Severity::from_score(79), Severity::High);
        assert_eq!(Severity::from_score(60), Severity::High);
        assert_eq!(Severity::from_score(40), Severity::Medium);
        assert_eq!(Severity::from_score(20), Severity::Low);
        assert_eq!(Severity::from_score(19), Severity::Info);
        assert_eq!(Severity::from_score(0), Severity::Info);
    }

    #[test]
    fn fine_score_thresholds() {
        assert_eq!(Severity::from_fine_score(10), Severity::Critical);
        assert_eq!(Severity::from_fine_score(7), Severity::Critical);
        assert_eq!(Severity::from_fine_score(5), Severity::High);
        assert_eq!(Severity::from_fine_score(3), Severity::Medium);
        assert_eq!(Severity::from_fine_score(1), Severity::Low);
        assert_eq!(Severity::from_fine_score(0), Severity::Info);
    }

    #[test]
    fn confidence_level_mapping() {
        assert_eq!(
            Severity::from_confidence_level("malicious"),
            Severity::Critical
        );
        assert_eq!(
            Severity::from_confidence_level("suspicious"),
            Severity::High
        );
        assert_eq!(Severity::from_confidence_level("n/a"), Severity::Medium);
        assert_eq!(Severity::from_confidence_level("benign"), Severity::Info);
        assert_eq!(Severity::from_confidence_level(""), Severity::Info);
    }

    #[test]
    fn rule_severity_is_case_insensitive_with_info_default() {
        assert_eq!(Severity::from_rule_severity("Critical"), Severity::Critical);
        assert_eq!(Severity::from_rule_severity("HIGH"), Severity::High);
        assert_eq!(Severity::from_rule_severity("medium"), Severity::Medium);
        assert_eq!(Severity::from_rule_severity("Low"), Severity::Low);
        assert_eq!(Severity::from_rule_severity("Informational"), Severity::Info);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&Severity::Info).unwrap(), "\"info\"");
    }
}

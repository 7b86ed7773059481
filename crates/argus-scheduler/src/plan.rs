//! Sync plan selection.
//!
//! Pure decision logic: the controller gathers the checkpoint state and the
//! completeness-oracle observations, and this module decides full versus
//! incremental and the window start. Kept free of I/O so every branch is
//! unit-testable.

use chrono::{DateTime, Duration, Utc};

/// What the completeness oracle reported for `(tenant, provider, url_hash)`.
#[derive(Debug, Clone, Copy)]
pub struct OracleObservation {
    /// Latest stored timestamp and row count scoped by URL fingerprint,
    /// when any rows exist.
    pub existing: Option<(DateTime<Utc>, u64)>,
    /// Whether stored coverage spans the configured full window.
    pub coverage_complete: bool,
}

/// Everything plan selection looks at.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs {
    /// The integration's last sync status is `pending`.
    pub pending: bool,
    /// Caller forced a full sync.
    pub force_full: bool,
    /// The full-sync latch for this key.
    pub full_sync_complete: bool,
    /// Durable checkpoint for this key.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Oracle observations; `None` when the oracle was not consulted or is
    /// unavailable.
    pub oracle: Option<OracleObservation>,
    pub now: DateTime<Utc>,
    /// Incremental fallback window when no checkpoint exists.
    pub lookback_days: i64,
    /// Historical window for a full backfill.
    pub full_window_days: i64,
}

/// The selected window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPlan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub full_sync: bool,
}

/// Decide full versus incremental for one integration.
///
/// A full sync is indicated by a pending status, an unset full-sync latch,
/// or an explicit force. Even then, if the oracle shows data from the same
/// vendor URL with complete coverage, the plan degrades to an incremental
/// run from `latest + 1s`: re-adding an integration with unchanged
/// credentials must not re-backfill. The `+1s` keeps the boundary event
/// from being emitted twice.
#[must_use]
pub fn select_plan(inputs: &PlanInputs) -> SyncPlan {
    let end = inputs.now;
    let needs_full = inputs.pending || !inputs.full_sync_complete || inputs.force_full;

    if needs_full {
        if let Some(oracle) = &inputs.oracle {
            if let Some((latest, count)) = oracle.existing {
                if count > 0 && oracle.coverage_complete {
                    return SyncPlan {
                        start: latest + Duration::seconds(1),
                        end,
                        full_sync: false,
                    };
                }
            }
        }
        return SyncPlan {
            start: end - Duration::days(inputs.full_window_days),
            end,
            full_sync: true,
        };
    }

    match inputs.checkpoint {
        Some(checkpoint) => SyncPlan {
            start: checkpoint + Duration::seconds(1),
            end,
            full_sync: false,
        },
        None => SyncPlan {
            start: end - Duration::days(inputs.lookback_days),
            end,
            full_sync: false,
        },
    }
}

impl SyncPlan {
    /// Start of one resource's window: a full sync widens to the
    /// resource-configured day count, an incremental run keeps the plan
    /// start.
    #[must_use]
    pub fn resource_start(&self, resource_days: i64) -> DateTime<Utc> {
        if self.full_sync {
            self.end - Duration::days(resource_days)
        } else {
            self.start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-07-15T12:00:00Z".parse().unwrap()
    }

    fn base() -> PlanInputs {
        PlanInputs {
            pending: false,
            force_full: false,
            full_sync_complete: true,
            checkpoint: None,
            oracle: None,
            now: now(),
            lookback_days: 7,
            full_window_days: 30,
        }
    }

    #[test]
    fn fresh_integration_with_no_prior_data_gets_a_full_window() {
        let plan = select_plan(&PlanInputs {
            pending: true,
            full_sync_complete: false,
            ..base()
        });

        assert!(plan.full_sync);
        assert_eq!(plan.start, now() - Duration::days(30));
        assert_eq!(plan.end, now());
    }

    #[test]
    fn returning_integration_resumes_from_checkpoint_plus_one_second() {
        let checkpoint: DateTime<Utc> = "2024-07-01T10:00:00Z".parse().unwrap();
        let plan = select_plan(&PlanInputs {
            checkpoint: Some(checkpoint),
            ..base()
        });

        assert!(!plan.full_sync);
        assert_eq!(plan.start, "2024-07-01T10:00:01Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn readded_integration_with_complete_data_degrades_to_incremental() {
        let latest: DateTime<Utc> = "2024-07-15T11:00:00Z".parse().unwrap();
        let plan = select_plan(&PlanInputs {
            pending: true,
            full_sync_complete: false,
            oracle: Some(OracleObservation {
                existing: Some((latest, 500)),
                coverage_complete: true,
            }),
            ..base()
        });

        assert!(!plan.full_sync);
        assert_eq!(plan.start, latest + Duration::seconds(1));
    }

    #[test]
    fn readded_integration_with_incomplete_coverage_backfills() {
        let latest: DateTime<Utc> = "2024-07-15T11:00:00Z".parse().unwrap();
        let plan = select_plan(&PlanInputs {
            pending: true,
            full_sync_complete: false,
            oracle: Some(OracleObservation {
                existing: Some((latest, 500)),
                coverage_complete: false,
            }),
            ..base()
        });

        assert!(plan.full_sync);
        assert_eq!(plan.start, now() - Duration::days(30));
    }

    #[test]
    fn missing_latch_triggers_full_even_when_status_is_success() {
        let plan = select_plan(&PlanInputs {
            full_sync_complete: false,
            ..base()
        });
        assert!(plan.full_sync);
    }

    #[test]
    fn no_checkpoint_falls_back_to_lookback() {
        let plan = select_plan(&base());
        assert!(!plan.full_sync);
        assert_eq!(plan.start, now() - Duration::days(7));
    }

    #[test]
    fn forced_full_overrides_checkpoint() {
        let plan = select_plan(&PlanInputs {
            force_full: true,
            checkpoint: Some("2024-07-01T10:00:00Z".parse().unwrap()),
            ..base()
        });
        assert!(plan.full_sync);
    }

    #[test]
    fn resource_start_widens_only_full_syncs() {
        let full = SyncPlan {
            start: now() - Duration::days(30),
            end: now(),
            full_sync: true,
        };
        assert_eq!(full.resource_start(365), now() - Duration::days(365));

        let incremental = SyncPlan {
            start: now() - Duration::days(1),
            end: now(),
            full_sync: false,
        };
        assert_eq!(incremental.resource_start(365), now() - Duration::days(1));
    }
}

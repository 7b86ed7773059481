//! The sync controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use argus_clickhouse::{ClickHouseClient, EVENTS_TABLE};
use argus_control::{ControlError, ControlPlane, Integration, StateStore, SyncStatus};
use argus_core::{Event, Provider, SinkError, SyncSink};
use argus_crowdstrike::{CrowdStrikeClient, CrowdStrikeConfig};
use argus_publish::{Publisher, CONTROLLER_BATCH_SIZE};
use argus_sentinelone::{SentinelOneClient, SentinelOneConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::plan::{select_plan, OracleObservation, PlanInputs, SyncPlan};
use crate::registry::SyncRegistry;

/// Historical window for a SentinelOne backfill.
const S1_FULL_WINDOW_DAYS: i64 = 30;
/// Historical window for a CrowdStrike backfill.
const CS_FULL_WINDOW_DAYS: i64 = 365;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick period for scheduled collection.
    pub poll_interval: Duration,
    /// Incremental fallback window when no checkpoint exists.
    pub lookback_days: i64,
    /// Wait between a reload trigger and the resync, so credential edits
    /// settle before they are re-read.
    pub reload_debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            lookback_days: 7,
            reload_debounce: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    running: bool,
    shutdown: CancellationToken,
}

struct Inner {
    config: SchedulerConfig,
    control: Arc<ControlPlane>,
    state: Arc<StateStore>,
    publisher: Arc<Publisher>,
    clickhouse: Option<Arc<ClickHouseClient>>,
    registry: SyncRegistry,
    reloads: SyncRegistry,
    vendor_runs: HashMap<Provider, tokio::sync::Mutex<()>>,
    lifecycle: Mutex<Lifecycle>,
}

/// Drives periodic and on-demand ingestion for every configured
/// integration. Cheap to clone; all clones share one controller.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        control: Arc<ControlPlane>,
        state: Arc<StateStore>,
        publisher: Arc<Publisher>,
        clickhouse: Option<Arc<ClickHouseClient>>,
    ) -> Self {
        let vendor_runs = Provider::ALL
            .into_iter()
            .map(|provider| (provider, tokio::sync::Mutex::new(())))
            .collect();

        Self {
            inner: Arc::new(Inner {
                config,
                control,
                state,
                publisher,
                clickhouse,
                registry: SyncRegistry::new(),
                reloads: SyncRegistry::new(),
                vendor_runs,
                lifecycle: Mutex::new(Lifecycle {
                    running: false,
                    shutdown: CancellationToken::new(),
                }),
            }),
        }
    }

    /// Install the recurring tick and run an immediate bootstrap collection
    /// in the background. Idempotent.
    pub fn start(&self) {
        let shutdown = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.running {
                return;
            }
            lifecycle.running = true;
            lifecycle.shutdown = CancellationToken::new();
            lifecycle.shutdown.clone()
        };

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_ticker(shutdown).await });
        info!("scheduler started");
    }

    /// Cancel every in-flight sync and halt the ticker. Idempotent.
    pub fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.running {
                return;
            }
            lifecycle.running = false;
            lifecycle.shutdown.cancel();
        }
        self.inner.registry.cancel_all();
        self.inner.reloads.cancel_all();
        info!("scheduler stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().running
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Run one collection cycle for the named vendor, or all vendors.
    /// Dispatches in the background and returns immediately.
    pub fn run_now(&self, source: &str) {
        let providers: &[Provider] = match source {
            "sentinelone" => &[Provider::SentinelOne],
            "crowdstrike" => &[Provider::CrowdStrike],
            "all" => &Provider::ALL,
            other => {
                warn!(source = other, "unknown source for manual trigger");
                return;
            }
        };

        for provider in providers {
            let scheduler = self.clone();
            let provider = *provider;
            tokio::spawn(async move {
                if let Err(error) = scheduler.collect(provider, false).await {
                    error!(%error, %provider, "manual collection failed");
                }
            });
        }
    }

    /// Signal cancellation on the matching sync context. Safe to call for
    /// unknown ids.
    pub fn cancel_sync(&self, integration_id: &str) {
        if !self.inner.registry.cancel(integration_id) {
            debug!(integration_id, "cancel requested for unknown sync");
        }
    }

    /// Cancel the current run for an integration and resync after the
    /// debounce delay, so the next run observes refreshed credentials. A
    /// second reload within the delay supersedes the first.
    pub fn trigger_reload(&self, integration_id: &str) {
        info!(integration_id, "integration updated, resync after debounce");
        self.inner.registry.cancel(integration_id);

        let guard = self.inner.reloads.register(integration_id);
        let scheduler = self.clone();
        let id = integration_id.to_string();

        tokio::spawn(async move {
            let debounce = scheduler.inner.config.reload_debounce;
            let heartbeat = Duration::from_secs(5).min(debounce);
            let started = tokio::time::Instant::now();

            loop {
                let remaining = debounce.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break;
                }
                tokio::select! {
                    () = guard.token().cancelled() => {
                        info!(integration_id = %id, "reload superseded, skipping resync");
                        return;
                    }
                    () = tokio::time::sleep(remaining.min(heartbeat)) => {
                        let left = debounce.saturating_sub(started.elapsed());
                        if !left.is_zero() {
                            info!(
                                integration_id = %id,
                                remaining_secs = left.as_secs(),
                                "waiting to resync"
                            );
                        }
                    }
                }
            }
            drop(guard);

            info!(integration_id = %id, "resyncing with refreshed credentials");
            for provider in Provider::ALL {
                if let Err(error) = scheduler.collect(provider, false).await {
                    error!(%error, %provider, "reload collection failed");
                }
            }
        });
    }

    async fn run_ticker(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for provider in Provider::ALL {
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            if let Err(error) = scheduler.collect(provider, false).await {
                                error!(%error, %provider, "scheduled collection failed");
                            }
                        });
                    }
                }
            }
        }
    }

    /// One collection pass over every integration of a vendor. Integrations
    /// run sequentially to cap outbound concurrency; a pass still in flight
    /// from a previous tick makes this one a no-op for the vendor.
    ///
    /// # Errors
    ///
    /// Fails only when the integration listing itself fails; the tick is
    /// aborted cleanly and the next tick retries.
    #[instrument(skip(self))]
    pub async fn collect(&self, provider: Provider, force_full: bool) -> Result<(), ControlError> {
        let Some(run_lock) = self.inner.vendor_runs.get(&provider) else {
            return Ok(());
        };
        let Ok(_running) = run_lock.try_lock() else {
            info!(%provider, "previous run still in flight, skipping tick");
            return Ok(());
        };

        info!(%provider, force_full, "starting collection");
        let integrations = match self.inner.control.fetch_integrations(provider).await {
            Ok(integrations) => integrations,
            Err(error) => {
                error!(%error, %provider, "failed to fetch integrations, aborting tick");
                return Err(error);
            }
        };

        for integration in &integrations {
            match provider {
                Provider::SentinelOne => self.sync_sentinelone(integration, force_full).await,
                Provider::CrowdStrike => self.sync_crowdstrike(integration, force_full).await,
            }
        }
        Ok(())
    }

    #[instrument(
        skip(self, integration),
        fields(integration_id = %integration.id, tenant_id = %integration.tenant_id)
    )]
    async fn sync_sentinelone(&self, integration: &Integration, force_full: bool) {
        let config = match SentinelOneConfig::parse(&integration.config) {
            Ok(config) => config,
            Err(error) => {
                error!(%error, "failed to parse SentinelOne config, skipping integration");
                return;
            }
        };
        let client = match SentinelOneClient::new(
            &integration.tenant_id,
            &integration.id,
            integration.display_name(),
            &config,
        ) {
            Ok(client) => client,
            Err(error) => {
                error!(%error, "failed to build SentinelOne client, skipping integration");
                return;
            }
        };

        let url_hash = client.url_hash();
        let plan = self
            .plan(
                Provider::SentinelOne,
                integration,
                &url_hash,
                S1_FULL_WINDOW_DAYS,
                force_full,
            )
            .await;
        info!(
            start = %plan.start,
            end = %plan.end,
            full_sync = plan.full_sync,
            url_hash = %url_hash,
            "selected plan"
        );

        let guard = self.inner.registry.register(&integration.id);
        let sink = self.progress_sink(integration, Provider::SentinelOne, &url_hash);
        let settings = &config.fetch_settings;
        let mut total = 0usize;
        let mut failed = false;

        let threats = settings.threats();
        if threats.enabled {
            match client
                .fetch_threats(
                    guard.token(),
                    plan.resource_start(threats.days),
                    plan.end,
                    &sink,
                )
                .await
            {
                Ok(count) => total += count,
                Err(error) if error.is_cancelled() => {
                    info!("threats sync cancelled");
                    return;
                }
                Err(error) => {
                    error!(%error, "failed to fetch threats");
                    self.post_status(integration, Provider::SentinelOne, Some(&error.to_string()))
                        .await;
                    failed = true;
                }
            }
        } else {
            info!("threats disabled by fetch settings");
        }

        let activities = settings.activities();
        if activities.enabled {
            match client
                .fetch_activities(
                    guard.token(),
                    plan.resource_start(activities.days),
                    plan.end,
                    &[],
                    &sink,
                )
                .await
            {
                Ok(count) => total += count,
                Err(error) if error.is_cancelled() => {
                    info!("activities sync cancelled");
                    return;
                }
                Err(error) => {
                    error!(%error, "failed to fetch activities");
                    self.post_status(integration, Provider::SentinelOne, Some(&error.to_string()))
                        .await;
                    failed = true;
                }
            }
        } else {
            info!("activities disabled by fetch settings");
        }

        let alerts = settings.alerts();
        if alerts.enabled {
            match client
                .fetch_alerts(
                    guard.token(),
                    plan.resource_start(alerts.days),
                    plan.end,
                    &sink,
                )
                .await
            {
                Ok(count) => total += count,
                Err(error) if error.is_cancelled() => {
                    info!("alerts sync cancelled");
                    return;
                }
                Err(error) => {
                    error!(%error, "failed to fetch alerts");
                    self.post_status(integration, Provider::SentinelOne, Some(&error.to_string()))
                        .await;
                    failed = true;
                }
            }
        } else {
            info!("alerts disabled by fetch settings");
        }

        if failed {
            return;
        }
        self.finish(integration, Provider::SentinelOne, &url_hash, plan, total)
            .await;
    }

    #[instrument(
        skip(self, integration),
        fields(integration_id = %integration.id, tenant_id = %integration.tenant_id)
    )]
    async fn sync_crowdstrike(&self, integration: &Integration, force_full: bool) {
        let config = match CrowdStrikeConfig::parse(&integration.config) {
            Ok(config) => config,
            Err(error) => {
                error!(%error, "failed to parse CrowdStrike config, skipping integration");
                return;
            }
        };
        let client = match CrowdStrikeClient::new(
            &integration.tenant_id,
            &integration.id,
            integration.display_name(),
            &config,
        ) {
            Ok(client) => client,
            Err(error) => {
                error!(%error, "failed to build CrowdStrike client, skipping integration");
                return;
            }
        };

        let url_hash = client.url_hash();
        let plan = self
            .plan(
                Provider::CrowdStrike,
                integration,
                &url_hash,
                CS_FULL_WINDOW_DAYS,
                force_full,
            )
            .await;
        info!(
            start = %plan.start,
            end = %plan.end,
            full_sync = plan.full_sync,
            url_hash = %url_hash,
            "selected plan"
        );

        let guard = self.inner.registry.register(&integration.id);
        let sink = self.progress_sink(integration, Provider::CrowdStrike, &url_hash);
        let settings = &config.fetch_settings;
        let mut total = 0usize;
        let mut failed = false;

        let alerts = settings.alerts();
        if alerts.enabled {
            match client
                .fetch_alerts(
                    guard.token(),
                    plan.resource_start(alerts.days),
                    plan.end,
                    &sink,
                )
                .await
            {
                Ok(count) => total += count,
                Err(error) if error.is_cancelled() => {
                    info!("alerts sync cancelled");
                    return;
                }
                Err(error) => {
                    error!(%error, "failed to fetch alerts");
                    self.post_status(integration, Provider::CrowdStrike, Some(&error.to_string()))
                        .await;
                    failed = true;
                }
            }
        } else {
            info!("alerts disabled by fetch settings");
        }

        let incidents = settings.incidents();
        if incidents.enabled {
            match client
                .fetch_incidents(
                    guard.token(),
                    plan.resource_start(incidents.days),
                    plan.end,
                    &sink,
                )
                .await
            {
                Ok(count) => total += count,
                Err(error) if error.is_cancelled() => {
                    info!("incidents sync cancelled");
                    return;
                }
                Err(error) => {
                    error!(%error, "failed to fetch incidents");
                    self.post_status(integration, Provider::CrowdStrike, Some(&error.to_string()))
                        .await;
                    failed = true;
                }
            }
        } else {
            info!("incidents disabled by fetch settings");
        }

        if failed {
            return;
        }
        self.finish(integration, Provider::CrowdStrike, &url_hash, plan, total)
            .await;
    }

    /// Gather checkpoint state and oracle observations, then pick the plan.
    /// The oracle is consulted only when a full sync is otherwise indicated.
    async fn plan(
        &self,
        provider: Provider,
        integration: &Integration,
        url_hash: &str,
        full_window_days: i64,
        force_full: bool,
    ) -> SyncPlan {
        let pending = integration.last_sync_status == SyncStatus::Pending;
        let state = self
            .inner
            .state
            .get(&integration.tenant_id, provider, url_hash)
            .await
            .unwrap_or_else(|error| {
                warn!(%error, "failed to read checkpoint state, treating as absent");
                None
            });
        let full_sync_complete = state.as_ref().is_some_and(|s| s.full_sync_complete);
        let checkpoint = state.and_then(|s| s.checkpoint);

        let oracle = if pending || !full_sync_complete || force_full {
            self.consult_oracle(&integration.tenant_id, provider, url_hash, full_window_days)
                .await
        } else {
            None
        };

        select_plan(&PlanInputs {
            pending,
            force_full,
            full_sync_complete,
            checkpoint,
            oracle,
            now: Utc::now(),
            lookback_days: self.inner.config.lookback_days,
            full_window_days,
        })
    }

    async fn consult_oracle(
        &self,
        tenant_id: &str,
        provider: Provider,
        url_hash: &str,
        window_days: i64,
    ) -> Option<OracleObservation> {
        let clickhouse = self.inner.clickhouse.as_ref()?;

        let existing = match clickhouse
            .latest_timestamp_by_url(tenant_id, provider.as_str(), url_hash)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                warn!(%error, "failed to check existing data by url");
                None
            }
        };

        let coverage_complete = if existing.is_some() {
            match clickhouse
                .check_completeness(tenant_id, provider.as_str(), window_days)
                .await
            {
                Ok(completeness) => completeness.complete,
                Err(error) => {
                    warn!(%error, "failed to check data completeness");
                    false
                }
            }
        } else {
            false
        };

        Some(OracleObservation {
            existing,
            coverage_complete,
        })
    }

    fn progress_sink(
        &self,
        integration: &Integration,
        provider: Provider,
        url_hash: &str,
    ) -> ProgressSink {
        ProgressSink {
            publisher: Arc::clone(&self.inner.publisher),
            state: Arc::clone(&self.inner.state),
            tenant_id: integration.tenant_id.clone(),
            provider,
            url_hash: url_hash.to_string(),
        }
    }

    /// Terminal-success bookkeeping: latch the full sync on its first
    /// completion, record the final checkpoint, report success, and nudge
    /// the downstream table to merge if anything was produced.
    async fn finish(
        &self,
        integration: &Integration,
        provider: Provider,
        url_hash: &str,
        plan: SyncPlan,
        total: usize,
    ) {
        if plan.full_sync {
            if let Err(error) = self
                .inner
                .state
                .mark_full_sync(&integration.tenant_id, provider, url_hash)
                .await
            {
                error!(%error, "failed to latch full sync state");
            }
        }
        if let Err(error) = self
            .inner
            .state
            .set_checkpoint(&integration.tenant_id, provider, url_hash, plan.end)
            .await
        {
            error!(%error, "failed to save final checkpoint");
        }

        self.post_status(integration, provider, None).await;

        if total > 0 {
            self.optimize().await;
        }
        info!(events = total, %provider, "collection completed");
    }

    async fn post_status(
        &self,
        integration: &Integration,
        provider: Provider,
        error_message: Option<&str>,
    ) {
        let status = if error_message.is_some() {
            SyncStatus::Error
        } else {
            SyncStatus::Success
        };
        if let Err(post_error) = self
            .inner
            .control
            .update_sync_status(&integration.tenant_id, provider, status, error_message)
            .await
        {
            warn!(%post_error, "failed to update sync status");
        }
    }

    async fn optimize(&self) {
        let Some(clickhouse) = &self.inner.clickhouse else {
            return;
        };
        info!("requesting merge of pending parts");
        if let Err(error) = clickhouse.optimize_table(EVENTS_TABLE).await {
            error!(%error, "failed to optimize events table");
        }
    }
}

/// The two per-page callbacks the controller installs on every fetch:
/// publish the page downstream, and advance the durable checkpoint.
struct ProgressSink {
    publisher: Arc<Publisher>,
    state: Arc<StateStore>,
    tenant_id: String,
    provider: Provider,
    url_hash: String,
}

#[async_trait]
impl SyncSink for ProgressSink {
    async fn publish_page(&self, events: Vec<Event>) -> Result<(), SinkError> {
        self.publisher
            .publish_batched(&events, CONTROLLER_BATCH_SIZE)
            .await
            .map_err(|error| SinkError::new(error.to_string()))
    }

    async fn advance_checkpoint(&self, through: DateTime<Utc>) {
        // Non-fatal: a missed write means some events repeat next tick and
        // the merge-on-read table reconciles them.
        if let Err(error) = self
            .state
            .set_checkpoint(&self.tenant_id, self.provider, &self.url_hash, through)
            .await
        {
            warn!(%error, "failed to save checkpoint");
        }
    }
}

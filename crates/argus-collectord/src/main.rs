//! Collector daemon entrypoint.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use argus_clickhouse::ClickHouseClient;
use argus_control::{ControlPlane, StateStore};
use argus_publish::Publisher;
use argus_scheduler::{Scheduler, SchedulerConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod http;

use config::CollectorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = CollectorConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.env == "development" {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        elysia_url = %config.elysia_url,
        vector_url = %config.vector_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        lookback_days = config.lookback_days,
        "starting argus collector"
    );

    // ClickHouse is optional at startup: without it the publisher falls back
    // to the pipeline service and the completeness oracle stays silent.
    let clickhouse = match ClickHouseClient::connect(&config.clickhouse).await {
        Ok(client) => {
            if let Err(error) = argus_clickhouse::run_migrations(&client).await {
                warn!(%error, "failed to run migrations");
            }
            Some(Arc::new(client))
        }
        Err(error) => {
            warn!(%error, "ClickHouse unavailable, publishing through Vector only");
            None
        }
    };

    let control = Arc::new(ControlPlane::new(
        config.elysia_url.clone(),
        config.collector_api_key.clone(),
    ));
    let state = Arc::new(StateStore::new(
        config.elysia_url.clone(),
        config.collector_api_key.clone(),
    ));
    let publisher = Arc::new(Publisher::new(config.vector_url.clone(), clickhouse.clone()));

    let scheduler = Scheduler::new(
        SchedulerConfig {
            poll_interval: config.poll_interval,
            lookback_days: config.lookback_days,
            ..SchedulerConfig::default()
        },
        control,
        state,
        publisher,
        clickhouse,
    );
    scheduler.start();

    let app = http::router(scheduler.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    scheduler.stop();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}

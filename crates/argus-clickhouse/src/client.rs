//! ClickHouse client: inserts, oracle queries, compaction hint.

use argus_core::Event;
use chrono::{DateTime, Duration, Utc};
use clickhouse::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::row::EventRow;
use crate::EVENTS_TABLE;

/// Errors from the downstream store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),
}

/// Connection settings for the store.
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8123,
            database: "argus".into(),
            username: "default".into(),
            password: String::new(),
        }
    }
}

/// Aggregate shape of stored data for one `(tenant, source)`.
#[derive(Debug, Clone, Copy)]
pub struct DataStats {
    pub total_events: u64,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

/// Answer from the completeness check.
#[derive(Debug, Clone, Copy)]
pub struct Completeness {
    /// Coverage spans the expected window.
    pub complete: bool,
    /// Newest stored event; the incremental resume point candidate.
    pub newest: DateTime<Utc>,
    /// The newest event is over an hour old. Reported for observability;
    /// does not make coverage incomplete.
    pub gap_likely: bool,
}

/// Client for the `security_events` table.
///
/// Callers treat it as thread-safe; the underlying HTTP client pools
/// connections internally.
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
}

impl ClickHouseClient {
    /// Connect and verify the server responds.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self, StoreError> {
        let client = Client::default()
            .with_url(format!("http://{}:{}", config.host, config.port))
            .with_database(&config.database)
            .with_user(&config.username)
            .with_password(&config.password);

        // Liveness probe; the HTTP client itself connects lazily.
        client.query("SELECT 1").execute().await?;
        info!(host = %config.host, database = %config.database, "connected to ClickHouse");

        Ok(Self { client })
    }

    /// Insert a batch of events. At-least-once; the ReplacingMergeTree
    /// collapses duplicate `(tenant_id, source, id)` rows at merge time.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn insert_events(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut insert = self.client.insert::<EventRow>(EVENTS_TABLE)?;
        for event in events {
            insert.write(&EventRow::from(event)).await?;
        }
        insert.end().await?;

        debug!(count = events.len(), "inserted events");
        Ok(())
    }

    /// Latest stored timestamp and row count for events carrying the given
    /// URL fingerprint in their raw blob.
    #[instrument(skip(self))]
    pub async fn latest_timestamp_by_url(
        &self,
        tenant_id: &str,
        source: &str,
        url_hash: &str,
    ) -> Result<Option<(DateTime<Utc>, u64)>, StoreError> {
        #[derive(Debug, clickhouse::Row, Deserialize)]
        struct Aggregate {
            #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
            latest: DateTime<Utc>,
            count: u64,
        }

        let row = self
            .client
            .query(
                "SELECT max(timestamp) AS latest, count() AS count \
                 FROM security_events \
                 WHERE tenant_id = ? AND source = ? \
                   AND JSONExtractString(raw, 'url_hash') = ?",
            )
            .bind(tenant_id)
            .bind(source)
            .bind(url_hash)
            .fetch_one::<Aggregate>()
            .await?;

        if row.count == 0 {
            return Ok(None);
        }
        debug!(
            latest = %row.latest,
            count = row.count,
            "found existing data for url hash"
        );
        Ok(Some((row.latest, row.count)))
    }

    /// Count and time span of all stored events for `(tenant, source)`.
    pub async fn data_stats(
        &self,
        tenant_id: &str,
        source: &str,
    ) -> Result<Option<DataStats>, StoreError> {
        #[derive(Debug, clickhouse::Row, Deserialize)]
        struct Aggregate {
            total: u64,
            #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
            oldest: DateTime<Utc>,
            #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
            newest: DateTime<Utc>,
        }

        let row = self
            .client
            .query(
                "SELECT count() AS total, min(timestamp) AS oldest, max(timestamp) AS newest \
                 FROM security_events WHERE tenant_id = ? AND source = ?",
            )
            .bind(tenant_id)
            .bind(source)
            .fetch_one::<Aggregate>()
            .await?;

        if row.total == 0 {
            return Ok(None);
        }
        Ok(Some(DataStats {
            total_events: row.total,
            oldest: row.oldest,
            newest: row.newest,
        }))
    }

    /// Decide whether existing data already covers the expected window.
    ///
    /// Coverage is complete when the oldest stored event is no more than a
    /// day inside the window start. A stale newest event is flagged but does
    /// not void completeness; the incremental sync closes that tail.
    #[instrument(skip(self))]
    pub async fn check_completeness(
        &self,
        tenant_id: &str,
        source: &str,
        window_days: i64,
    ) -> Result<Completeness, StoreError> {
        let Some(stats) = self.data_stats(tenant_id, source).await? else {
            return Ok(Completeness {
                complete: false,
                newest: DateTime::<Utc>::UNIX_EPOCH,
                gap_likely: false,
            });
        };

        let now = Utc::now();
        let expected_start = now - Duration::days(window_days);

        if stats.oldest > expected_start + Duration::hours(24) {
            info!(
                oldest = %stats.oldest,
                expected_start = %expected_start,
                "data incomplete, oldest event inside expected window"
            );
            return Ok(Completeness {
                complete: false,
                newest: stats.newest,
                gap_likely: false,
            });
        }

        let gap_likely = stats.newest < now - Duration::hours(1);
        if gap_likely {
            info!(newest = %stats.newest, "newest event is stale, gap likely");
        }

        Ok(Completeness {
            complete: true,
            newest: stats.newest,
            gap_likely,
        })
    }

    /// Ask the store to merge pending parts now.
    ///
    /// Event-driven rather than scheduled; merges are expensive and only
    /// worth forcing right after bulk inserts.
    pub async fn optimize_table(&self, table: &str) -> Result<(), StoreError> {
        self.client
            .query(&format!("OPTIMIZE TABLE {table} FINAL"))
            .execute()
            .await?;
        info!(table, "optimized table");
        Ok(())
    }

    pub(crate) fn raw_client(&self) -> &Client {
        &self.client
    }
}

//! Schema migrations.
//!
//! Migrations are embedded in the binary and applied in order; applied
//! versions are tracked in `schema_migrations` so a restart never re-runs
//! one. Each migration file holds a single statement.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{ClickHouseClient, StoreError};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_security_events",
        include_str!("../migrations/001_create_security_events.sql"),
    ),
    (
        "002_index_url_hash",
        include_str!("../migrations/002_index_url_hash.sql"),
    ),
];

#[derive(Debug, Row, Serialize, Deserialize)]
struct MigrationRow {
    version: String,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    applied_at: DateTime<Utc>,
}

/// Apply any migrations not yet recorded in `schema_migrations`.
pub async fn run_migrations(client: &ClickHouseClient) -> Result<(), StoreError> {
    let ch = client.raw_client();

    ch.query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
             version String, \
             applied_at DateTime('UTC')\
         ) ENGINE = MergeTree ORDER BY version",
    )
    .execute()
    .await?;

    let applied: Vec<String> = ch
        .query("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all()
        .await?;

    for (version, sql) in MIGRATIONS {
        if applied.iter().any(|v| v == version) {
            continue;
        }

        info!(version, "applying migration");
        ch.query(sql).execute().await?;

        let mut insert = ch.insert::<MigrationRow>("schema_migrations")?;
        insert
            .write(&MigrationRow {
                version: (*version).to_string(),
                applied_at: Utc::now(),
            })
            .await?;
        insert.end().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let mut versions: Vec<&str> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let sorted = {
            let mut s = versions.clone();
            s.sort_unstable();
            s
        };
        assert_eq!(versions, sorted);
        versions.dedup();
        assert_eq!(versions.len(), MIGRATIONS.len());
    }

    #[test]
    fn migration_files_hold_one_statement() {
        for (version, sql) in MIGRATIONS {
            assert!(
                !sql.trim_end().trim_end_matches(';').contains(';'),
                "{version} must hold a single statement"
            );
        }
    }
}

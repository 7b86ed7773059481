//! Environment configuration.
//!
//! All settings come from the environment (with a `.env` file honoured in
//! development). The resulting value is threaded through constructors; there
//! is no process-global config.

use std::env;
use std::time::Duration;

use argus_clickhouse::ClickHouseConfig;

/// Collector daemon settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Control-plane base URL.
    pub elysia_url: String,
    /// Pipeline-service base URL (publish fallback).
    pub vector_url: String,
    pub poll_interval: Duration,
    pub lookback_days: i64,
    /// Shared secret for control-plane calls.
    pub collector_api_key: String,
    pub clickhouse: ClickHouseConfig,
    /// `development` or `production`; controls log formatting.
    pub env: String,
    /// Admin HTTP port.
    pub port: u16,
}

impl CollectorConfig {
    /// Load from the environment.
    ///
    /// # Errors
    ///
    /// Fails when `COLLECTOR_API_KEY` is unset in production.
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = env_or("ENV", "development");

        let collector_api_key = match env::var("COLLECTOR_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ if environment == "production" => {
                anyhow::bail!("COLLECTOR_API_KEY is required in production")
            }
            _ => "dev_collector_key_change_in_production".to_string(),
        };

        let poll_interval = env::var("POLL_INTERVAL")
            .ok()
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(300));

        let lookback_days = env::var("LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        Ok(Self {
            elysia_url: env_or("ELYSIA_URL", "http://localhost:8000"),
            vector_url: env_or("VECTOR_URL", "http://localhost:8686"),
            poll_interval,
            lookback_days,
            collector_api_key,
            clickhouse: ClickHouseConfig {
                host: env_or("CLICKHOUSE_HOST", "localhost"),
                port: env::var("CLICKHOUSE_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8123),
                database: env_or("CLICKHOUSE_DB", "argus"),
                username: env_or("CLICKHOUSE_USER", "default"),
                password: env_or("CLICKHOUSE_PASSWORD", ""),
            },
            env: environment,
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8001),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse duration strings like "30s", "5m", "1h".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if s.ends_with("ms") {
        if let Ok(ms) = s.trim_end_matches("ms").parse::<u64>() {
            return Some(Duration::from_millis(ms));
        }
    }
    if s.ends_with('s') && !s.ends_with("ms") {
        if let Ok(secs) = s.trim_end_matches('s').parse::<f64>() {
            return Some(Duration::from_secs_f64(secs));
        }
    }
    if s.ends_with('m') {
        if let Ok(mins) = s.trim_end_matches('m').parse::<u64>() {
            return Some(Duration::from_secs(mins * 60));
        }
    }
    if s.ends_with('h') {
        if let Ok(hours) = s.trim_end_matches('h').parse::<u64>() {
            return Some(Duration::from_secs(hours * 3600));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_suffixes() {
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("nope"), None);
    }
}

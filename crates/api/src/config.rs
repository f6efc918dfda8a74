//! Application configuration loaded from environment variables.

use std::time::Duration;

use outbox::WorkerOptions;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Server and engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string (default: `None`, uses in-memory stores)
/// - `DB_MAX_CONNECTIONS` — max database pool connections (default: `10`)
/// - `WORKER_COUNT` — outbox worker tasks (default: `2`)
/// - `EMPTY_QUEUE_DELAY_MS` — worker sleep on a drained queue (default: `1000`)
/// - `LEASE_TTL_SECS` — outbox message lease (default: `30`)
/// - `TRANSIENT_CONFLICT_DELAY_MS` — re-queue delay after a transient conflict (default: `2000`)
/// - `MAX_ATTEMPTS_BEFORE_DLQ` — attempt warning threshold (default: `10`)
/// - `STEP_LEASE_SECS` — step lock lease (default: `120`)
/// - `OVERDRAFT_LIMIT` — lowest balance a debit may leave (default: `-50000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub worker_count: usize,
    pub empty_queue_delay: Duration,
    pub lease_ttl: Duration,
    pub transient_conflict_delay: Duration,
    pub max_attempts_before_dlq: i32,
    pub step_lease: Duration,
    pub overdraft_limit: Decimal,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            worker_count: env_parse("WORKER_COUNT", 2),
            empty_queue_delay: Duration::from_millis(env_parse("EMPTY_QUEUE_DELAY_MS", 1000)),
            lease_ttl: Duration::from_secs(env_parse("LEASE_TTL_SECS", 30)),
            transient_conflict_delay: Duration::from_millis(env_parse(
                "TRANSIENT_CONFLICT_DELAY_MS",
                2000,
            )),
            max_attempts_before_dlq: env_parse("MAX_ATTEMPTS_BEFORE_DLQ", 10),
            step_lease: Duration::from_secs(env_parse("STEP_LEASE_SECS", 120)),
            overdraft_limit: env_parse("OVERDRAFT_LIMIT", dec!(-50000)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the outbox worker tuning derived from this configuration.
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            empty_queue_delay: self.empty_queue_delay,
            lease_ttl: self.lease_ttl,
            transient_conflict_delay: self.transient_conflict_delay,
            max_attempts_before_dlq: self.max_attempts_before_dlq,
            ..WorkerOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            db_max_connections: 10,
            worker_count: 2,
            empty_queue_delay: Duration::from_secs(1),
            lease_ttl: Duration::from_secs(30),
            transient_conflict_delay: Duration::from_secs(2),
            max_attempts_before_dlq: 10,
            step_lease: Duration::from_secs(120),
            overdraft_limit: dec!(-50000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.overdraft_limit, dec!(-50000));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_worker_options_carry_config() {
        let config = Config {
            lease_ttl: Duration::from_secs(45),
            transient_conflict_delay: Duration::from_secs(3),
            ..Config::default()
        };
        let options = config.worker_options();
        assert_eq!(options.lease_ttl, Duration::from_secs(45));
        assert_eq!(options.transient_conflict_delay, Duration::from_secs(3));
        assert_eq!(options.max_attempts_before_dlq, 10);
    }
}

//! Connection pool configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use sqlx::mysql::MySqlConnectOptions;

use crate::DbError;

fn default_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_keep_alive_interval() -> Duration {
    Duration::from_secs(10)
}

fn duration_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Everything the pool needs to reach the database.
///
/// Built once and handed to [`DbPool::connect`](crate::DbPool::connect). The
/// pool owns it from then on, and there are no setters.
///
/// ```ignore
/// let config = PoolConfig::new("db.internal", "recipes", "secret", "recipes")
///     .with_port(3307)
///     .with_max_connections(20);
/// ```
#[derive(Clone, Deserialize)]
pub struct PoolConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    user: String,
    #[serde(default)]
    password: String,
    database: String,
    #[serde(default = "default_max_connections")]
    max_connections: u32,
    #[serde(
        rename = "connect_timeout_ms",
        default = "default_connect_timeout",
        deserialize_with = "duration_ms"
    )]
    connect_timeout: Duration,
    #[serde(
        rename = "keep_alive_interval_ms",
        default = "default_keep_alive_interval",
        deserialize_with = "duration_ms"
    )]
    keep_alive_interval: Duration,
}

impl PoolConfig {
    /// Create a configuration with default port (3306), 10 connections,
    /// a 10 s connect timeout and a 10 s keep-alive interval.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            keep_alive_interval: default_keep_alive_interval(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Bound on establishing a single connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    /// Reject configurations the pool cannot work with.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.host.trim().is_empty() {
            return Err(DbError::InvalidConfig("host must not be empty".into()));
        }
        if self.database.trim().is_empty() {
            return Err(DbError::InvalidConfig("database must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(DbError::InvalidConfig("max_connections must be at least 1".into()));
        }
        if self.connect_timeout.is_zero() || self.keep_alive_interval.is_zero() {
            return Err(DbError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .charset("utf8mb4")
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::new("localhost", "recipes", "hunter2", "recipes")
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = config();
        assert_eq!(config.port(), 3306);
        assert_eq!(config.max_connections(), 10);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_connections_is_rejected() {
        let err = config().with_max_connections(0).validate().unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)));
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = PoolConfig::new(" ", "u", "p", "d").validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn deserializes_with_defaults_and_millisecond_durations() {
        let config: PoolConfig = serde_json::from_str(
            r#"{
                "host": "db",
                "user": "recipes",
                "database": "recipes",
                "connect_timeout_ms": 2500
            }"#,
        )
        .unwrap();
        assert_eq!(config.host(), "db");
        assert_eq!(config.port(), 3306);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(10));
    }
}

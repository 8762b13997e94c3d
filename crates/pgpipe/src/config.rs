//! Client connection configuration.
//!
//! Provides the parameters for opening a pipelined PostgreSQL connection:
//! where to connect, the startup parameters to send, and the SSL policy.
//! Configurations can be built in code or loaded from JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pgpipe_core::error::ConfigError;

/// SSL policy applied right after the TCP connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Do not send an SSLRequest
    #[default]
    Disable,
    /// Ask for SSL, continue in plaintext if the server declines
    Prefer,
    /// Ask for SSL and fail if the server declines
    Require,
}

impl SslMode {
    /// Check if SSL should be attempted.
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Check if SSL is required.
    pub const fn is_required(self) -> bool {
        matches!(self, SslMode::Require)
    }
}

/// Connection configuration for [`PgClient::connect`](crate::PgClient::connect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 5432)
    pub port: u16,
    /// Role to start the session as
    pub user: String,
    /// Database name; the server defaults it to the user name when empty
    pub database: String,
    /// Application name (visible in pg_stat_activity)
    pub application_name: Option<String>,
    /// TCP connect timeout
    #[serde(rename = "connect_timeout_secs", with = "duration_secs")]
    pub connect_timeout: Duration,
    /// SSL mode
    pub ssl_mode: SslMode,
    /// Additional startup parameters
    pub options: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            database: String::new(),
            application_name: None,
            connect_timeout: Duration::from_secs(30),
            ssl_mode: SslMode::default(),
            options: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration for `user` on `host`.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError {
            message: format!("Invalid client configuration: {}", e),
            source: Some(Box::new(e)),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields a connection cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problem = if self.host.trim().is_empty() {
            "host must not be empty"
        } else if self.port == 0 {
            "port must not be zero"
        } else if self.user.trim().is_empty() {
            "user must not be empty"
        } else {
            return Ok(());
        };
        Err(ConfigError {
            message: problem.to_string(),
            source: None,
        })
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set an additional startup parameter.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Build the startup parameters to send to the server.
    pub fn startup_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("user".to_string(), self.user.clone())];

        if !self.database.is_empty() {
            params.push(("database".to_string(), self.database.clone()));
        }
        params.push(("client_encoding".to_string(), "UTF8".to_string()));

        if let Some(app_name) = &self.application_name {
            params.push(("application_name".to_string(), app_name.clone()));
        }

        for (k, v) in &self.options {
            params.push((k.clone(), v.clone()));
        }

        params
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("localhost", "postgres")
            .port(5433)
            .database("testdb")
            .application_name("myapp")
            .connect_timeout(Duration::from_secs(10))
            .ssl_mode(SslMode::Prefer)
            .option("timezone", "UTC");

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5433);
        assert_eq!(config.user, "postgres");
        assert_eq!(config.database, "testdb");
        assert_eq!(config.application_name, Some("myapp".to_string()));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ssl_mode, SslMode::Prefer);
        assert_eq!(config.options.get("timezone"), Some(&"UTC".to_string()));
    }

    #[test]
    fn test_startup_params() {
        let config = ClientConfig::new("localhost", "postgres")
            .database("testdb")
            .application_name("myapp")
            .option("timezone", "UTC");

        let params = config.startup_params();

        assert_eq!(params[0], ("user".to_string(), "postgres".to_string()));
        assert!(params.iter().any(|(k, v)| k == "database" && v == "testdb"));
        assert!(
            params
                .iter()
                .any(|(k, v)| k == "client_encoding" && v == "UTF8")
        );
        assert!(
            params
                .iter()
                .any(|(k, v)| k == "application_name" && v == "myapp")
        );
        assert!(params.iter().any(|(k, v)| k == "timezone" && v == "UTC"));
    }

    #[test]
    fn test_startup_params_omit_empty_database() {
        let params = ClientConfig::new("localhost", "alice").startup_params();
        assert!(params.iter().all(|(k, _)| k != "database"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ClientConfig::new("db.example.com", "user").port(5433);
        assert_eq!(config.socket_addr(), "db.example.com:5433");
    }

    #[test]
    fn test_ssl_mode_properties() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(!SslMode::Disable.is_required());

        assert!(SslMode::Prefer.should_try_ssl());
        assert!(!SslMode::Prefer.is_required());

        assert!(SslMode::Require.should_try_ssl());
        assert!(SslMode::Require.is_required());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ClientConfig::from_json(
            r#"{"host": "db", "user": "alice", "ssl_mode": "prefer", "connect_timeout_secs": 5}"#,
        )
        .unwrap();

        assert_eq!(config.host, "db");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "alice");
        assert_eq!(config.ssl_mode, SslMode::Prefer);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        let err = ClientConfig::from_json(r#"{"host": "db", "port": "x"}"#).unwrap_err();
        assert!(err.message.starts_with("Invalid client configuration"));

        let err = ClientConfig::from_json(r#"{"host": "db"}"#).unwrap_err();
        assert_eq!(err.message, "user must not be empty");

        let err = ClientConfig::from_json(r#"{"user": "a", "port": 0}"#).unwrap_err();
        assert_eq!(err.message, "port must not be zero");
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClientConfig::new("db", "alice")
            .ssl_mode(SslMode::Require)
            .option("search_path", "app");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"connect_timeout_secs\":30"));
        assert!(json.contains("\"ssl_mode\":\"require\""));
        assert_eq!(ClientConfig::from_json(&json).unwrap(), config);
    }
}

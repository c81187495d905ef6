//! Configuration management for the simulation client.
//!
//! Configuration can be set via environment variables:
//! - `ALPYNE_JAVA` - Optional. Java executable used to start the server. Defaults to `java`.
//! - `ALPYNE_SERVER_LIB` - Optional. Directory holding the AlpyneServer jars.
//!   Defaults to `resources` next to the executable, then `./resources`.
//! - `ALPYNE_HOST` - Optional. Host the server listens on. Defaults to `127.0.0.1`.
//! - `ALPYNE_HTTP_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to `10`.
//! - `ALPYNE_JAVA_LOG_LEVEL` - Optional. Server log level. Defaults to `INFO`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::constants::JavaLogLevel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Java executable
    pub java_path: String,

    /// Directory with the server library jars
    pub server_lib: PathBuf,

    /// Host the server binds to and the client connects to
    pub host: String,

    /// Default HTTP request timeout
    pub http_timeout: Duration,

    /// Log level passed to the server
    pub java_log_level: JavaLogLevel,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            java_path: "java".to_string(),
            server_lib: default_server_lib(),
            host: "127.0.0.1".to_string(),
            http_timeout: Duration::from_secs(10),
            java_log_level: JavaLogLevel::Info,
        }
    }
}

fn default_server_lib() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("resources"))
}

impl SimConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or enumerated variable
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let java_path = lookup("ALPYNE_JAVA").unwrap_or(defaults.java_path);

        let server_lib = lookup("ALPYNE_SERVER_LIB")
            .map(PathBuf::from)
            .unwrap_or(defaults.server_lib);

        let host = lookup("ALPYNE_HOST").unwrap_or(defaults.host);

        let http_timeout = match lookup("ALPYNE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| {
                    ConfigError::InvalidValue("ALPYNE_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
                })?,
            None => defaults.http_timeout,
        };

        let java_log_level = match lookup("ALPYNE_JAVA_LOG_LEVEL") {
            Some(raw) => JavaLogLevel::from_str_ci(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "ALPYNE_JAVA_LOG_LEVEL".to_string(),
                    format!("unknown level '{}'", raw),
                )
            })?,
            None => defaults.java_log_level,
        };

        Ok(Self {
            java_path,
            server_lib,
            host,
            http_timeout,
            java_log_level,
        })
    }
}

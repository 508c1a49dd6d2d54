//! Service configuration.
//!
//! Loaded from a JSON file (`conf.json` by default) and then overridden by
//! command-line flags or environment variables. Every field has a default, so
//! a partial file is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use board_core::{
    BackendKind, ConnectOptions, CONNECT_TIMEOUT_MS_DEFAULT, DOCUMENT_DATABASE_DEFAULT,
    OPERATION_TIMEOUT_MS_DEFAULT, POOL_CONNECTIONS_COUNT_DEFAULT,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Config file read when none is given explicitly.
pub const CONFIG_PATH_DEFAULT: &str = "conf.json";

/// Default HTTP port.
pub const HTTP_PORT_DEFAULT: u16 = 8080;

/// Default bind host.
pub const BIND_HOST_DEFAULT: &str = "127.0.0.1";

/// Default time allowed for in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE_MS_DEFAULT: u64 = 3_000;

// =============================================================================
// Config
// =============================================================================

/// Resolved service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Storage backend
    pub backend: BackendKind,
    /// Connection URL for postgres or mongo
    pub database_url: Option<String>,
    /// Mongo database name
    pub database_name: String,
    /// HTTP listen port
    pub http_port: u16,
    /// HTTP listen host
    pub bind_host: String,
    /// Per-operation storage timeout
    pub operation_timeout_ms: u64,
    /// Storage pool size
    pub max_connections: u32,
    /// Grace period for in-flight requests on shutdown
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Postgres,
            database_url: None,
            database_name: DOCUMENT_DATABASE_DEFAULT.to_string(),
            http_port: HTTP_PORT_DEFAULT,
            bind_host: BIND_HOST_DEFAULT.to_string(),
            operation_timeout_ms: OPERATION_TIMEOUT_MS_DEFAULT,
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            shutdown_grace_ms: SHUTDOWN_GRACE_MS_DEFAULT,
        }
    }
}

/// Command-line and environment overrides. Unset fields leave the file value.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// Storage backend: postgres, mongo or memory
    #[arg(long, env = "POSTBOARD_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Mongo database name
    #[arg(long, env = "POSTBOARD_DATABASE_NAME")]
    pub database_name: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "POSTBOARD_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// HTTP listen host
    #[arg(long, env = "POSTBOARD_BIND_HOST")]
    pub bind_host: Option<String>,

    /// Per-operation storage timeout in milliseconds
    #[arg(long, env = "POSTBOARD_OPERATION_TIMEOUT_MS")]
    pub operation_timeout_ms: Option<u64>,

    /// Storage pool size
    #[arg(long, env = "POSTBOARD_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Shutdown grace period in milliseconds
    #[arg(long, env = "POSTBOARD_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: Option<u64>,
}

impl Config {
    /// Read a config file.
    ///
    /// A missing file yields defaults unless `required` is set.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid config JSON.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides on top of this config.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(url) = overrides.database_url {
            self.database_url = Some(url);
        }
        if let Some(name) = overrides.database_name {
            self.database_name = name;
        }
        if let Some(port) = overrides.http_port {
            self.http_port = port;
        }
        if let Some(host) = overrides.bind_host {
            self.bind_host = host;
        }
        if let Some(timeout) = overrides.operation_timeout_ms {
            self.operation_timeout_ms = timeout;
        }
        if let Some(count) = overrides.max_connections {
            self.max_connections = count;
        }
        if let Some(grace) = overrides.shutdown_grace_ms {
            self.shutdown_grace_ms = grace;
        }
        self
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_url = matches!(self.backend, BackendKind::Postgres | BackendKind::Mongo);
        let has_url = self
            .database_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if needs_url && !has_url {
            return Err(ConfigError::invalid(
                "database_url",
                format!("required for the {} backend", self.backend),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::invalid("operation_timeout_ms", "must be positive"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_connections", "must be positive"));
        }
        if self.backend == BackendKind::Mongo && self.database_name.trim().is_empty() {
            return Err(ConfigError::invalid("database_name", "must not be empty"));
        }
        self.socket_addr().map(|_| ())
    }

    /// Address to listen on.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `bind_host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_host, self.http_port)
            .parse()
            .map_err(|e| ConfigError::invalid("bind_host", format!("{e}")))
    }

    /// Per-operation storage timeout.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Grace period on shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Storage connection settings.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            backend: self.backend,
            url: self.database_url.clone(),
            database: self.database_name.clone(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT),
            op_timeout: self.operation_timeout(),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid config JSON
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field failed validation
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"{"database_url": "postgres://localhost/board", "http_port": 9000}"#,
        );
        let config = Config::load(file.path(), true).unwrap();

        assert_eq!(config.backend, BackendKind::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/board"));
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.operation_timeout_ms, OPERATION_TIMEOUT_MS_DEFAULT);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf.json");

        assert_eq!(Config::load(&path, false).unwrap(), Config::default());
        assert!(matches!(
            Config::load(&path, true),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let file = write_config(r#"{"http_prot": 1}"#);
        assert!(matches!(
            Config::load(file.path(), true),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::default().with_overrides(ConfigOverrides {
            backend: Some(BackendKind::Memory),
            http_port: Some(0),
            max_connections: Some(4),
            shutdown_grace_ms: Some(250),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.http_port, 0);
        assert_eq!(config.connect_options().max_connections, 4);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
        assert_eq!(config.bind_host, BIND_HOST_DEFAULT);
        config.validate().unwrap();
    }

    #[test]
    fn test_database_backends_need_url() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "database_url", .. }));

        let mongo = Config {
            backend: BackendKind::Mongo,
            database_url: Some("mongodb://localhost:27017".into()),
            ..Config::default()
        };
        mongo.validate().unwrap();
        assert_eq!(mongo.connect_options().database, DOCUMENT_DATABASE_DEFAULT);
    }

    #[test]
    fn test_bad_bind_host() {
        let config = Config {
            backend: BackendKind::Memory,
            bind_host: "not a host".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "bind_host", .. })
        ));
    }
}

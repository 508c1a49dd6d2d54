//! Backend selection at startup.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    CONNECT_TIMEOUT_MS_DEFAULT, DOCUMENT_DATABASE_DEFAULT, OPERATION_TIMEOUT_MS_DEFAULT,
    POOL_CONNECTIONS_COUNT_DEFAULT,
};

use super::error::{StorageError, StorageResult};
use super::repository::{BackendKind, Repository};
use super::sim::SimRepository;

/// Everything needed to open any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Which backend to open
    pub backend: BackendKind,
    /// Connection URL; required for postgres and mongo
    pub url: Option<String>,
    /// Document database name (mongo only)
    pub database: String,
    /// Pool size
    pub max_connections: u32,
    /// Time allowed to connect
    pub connect_timeout: Duration,
    /// Per-operation budget
    pub op_timeout: Duration,
}

impl ConnectOptions {
    /// Defaults for `backend`.
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            url: None,
            database: DOCUMENT_DATABASE_DEFAULT.to_string(),
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT),
            op_timeout: Duration::from_millis(OPERATION_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Set the connection URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn require_url(&self) -> StorageResult<&str> {
        self.url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                StorageError::invalid("database_url", format!("required for {}", self.backend))
            })
    }
}

/// Open the configured backend.
///
/// # Errors
/// Returns [`StorageError::InvalidParameter`] when the URL is missing or the
/// backend was compiled out, and whatever the backend's `connect` returns.
pub async fn connect(options: &ConnectOptions) -> StorageResult<Arc<dyn Repository>> {
    tracing::info!(backend = %options.backend, "opening repository");

    match options.backend {
        BackendKind::Memory => Ok(Arc::new(
            SimRepository::new().with_op_timeout(options.op_timeout),
        )),
        BackendKind::Postgres => connect_postgres(options).await,
        BackendKind::Mongo => connect_mongo(options).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(options: &ConnectOptions) -> StorageResult<Arc<dyn Repository>> {
    use super::postgres::{PostgresConfig, PostgresRepository};

    let config = PostgresConfig {
        url: options.require_url()?.to_string(),
        max_connections: options.max_connections,
        connect_timeout: options.connect_timeout,
        op_timeout: options.op_timeout,
    };
    Ok(Arc::new(PostgresRepository::connect(config).await?))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(options: &ConnectOptions) -> StorageResult<Arc<dyn Repository>> {
    options.require_url()?;
    Err(StorageError::invalid("backend", "built without the postgres feature"))
}

#[cfg(feature = "mongo")]
async fn connect_mongo(options: &ConnectOptions) -> StorageResult<Arc<dyn Repository>> {
    use super::mongo::{MongoConfig, MongoRepository};

    let config = MongoConfig {
        uri: options.require_url()?.to_string(),
        database: options.database.clone(),
        max_connections: options.max_connections,
        connect_timeout: options.connect_timeout,
        op_timeout: options.op_timeout,
    };
    Ok(Arc::new(MongoRepository::connect(config).await?))
}

#[cfg(not(feature = "mongo"))]
async fn connect_mongo(options: &ConnectOptions) -> StorageResult<Arc<dyn Repository>> {
    options.require_url()?;
    Err(StorageError::invalid("backend", "built without the mongo feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_needs_no_url() {
        let repo = connect(&ConnectOptions::new(BackendKind::Memory)).await.unwrap();
        assert_eq!(repo.backend(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn test_database_backends_need_url() {
        for backend in [BackendKind::Postgres, BackendKind::Mongo] {
            let err = connect(&ConnectOptions::new(backend)).await.err().unwrap();
            assert!(matches!(
                err,
                StorageError::InvalidParameter { name: "database_url", .. }
            ));
        }
    }
}

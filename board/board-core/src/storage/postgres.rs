//! PostgresRepository - Relational Storage
//!
//! TigerStyle: pooled connections, explicit schema, bound parameters only.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PostgresRepository                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (connection pooling)                     │
//! │  Tables: users (id, login, full_name, created_at)            │
//! │          posts (id, user_id, text, created_at)               │
//! │  Index: UNIQUE on users.login, btree on posts.user_id        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS users (
//!     id BIGSERIAL PRIMARY KEY,
//!     login TEXT NOT NULL UNIQUE,
//!     full_name TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE TABLE IF NOT EXISTS posts (
//!     id BIGSERIAL PRIMARY KEY,
//!     user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
//!     text TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::constants::{
    CONNECT_TIMEOUT_MS_DEFAULT, OPERATION_TIMEOUT_MS_DEFAULT, POOL_CONNECTIONS_COUNT_DEFAULT,
    POSTS_TABLE, USERS_TABLE,
};
use crate::context::OpContext;
use crate::model::{NewPost, NewUser, Post, PostId, User, UserId};
use crate::query::sql::{self, SqlParam, SqlQuery, POST_COLUMNS, USER_COLUMNS};
use crate::query::{validate_new_post, validate_new_user, PostListQuery, UserListQuery};

use super::error::{StorageError, StorageResult};
use super::repository::{BackendKind, Repository};

/// PostgreSQL error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        login TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS posts (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id)",
];

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// `postgres://` connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Time allowed to establish or acquire a connection
    pub connect_timeout: Duration,
    /// Per-operation budget
    pub op_timeout: Duration,
}

impl PostgresConfig {
    /// Defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT),
            op_timeout: Duration::from_millis(OPERATION_TIMEOUT_MS_DEFAULT),
        }
    }
}

// =============================================================================
// PostgresRepository
// =============================================================================

/// PostgreSQL repository.
pub struct PostgresRepository {
    pool: PgPool,
    op_timeout: Duration,
}

impl PostgresRepository {
    /// Connect, then create the schema if it does not exist.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] for a non-postgres URL and
    /// [`StorageError::Connection`] if the pool cannot be created.
    ///
    /// # Example
    /// ```ignore
    /// let repo = PostgresRepository::connect(PostgresConfig::new("postgres://localhost/board")).await?;
    /// ```
    pub async fn connect(config: PostgresConfig) -> StorageResult<Self> {
        if !(config.url.starts_with("postgres://") || config.url.starts_with("postgresql://")) {
            return Err(StorageError::invalid(
                "database_url",
                "must be a postgres:// or postgresql:// URL",
            ));
        }
        if config.max_connections == 0 {
            return Err(StorageError::invalid("max_connections", "must be positive"));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            "connected to postgres"
        );

        Self::from_pool(pool, config.op_timeout).await
    }

    /// Wrap an existing pool.
    ///
    /// # Errors
    /// Returns [`StorageError::Internal`] if the schema cannot be created.
    pub async fn from_pool(pool: PgPool, op_timeout: Duration) -> StorageResult<Self> {
        let repo = Self { pool, op_timeout };
        repo.init_schema().await?;
        Ok(repo)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::internal(format!("failed to create schema: {e}")))?;
        }
        Ok(())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_users(&self, query: &SqlQuery) -> StorageResult<Vec<User>> {
        let rows = bind_all(sqlx::query(&query.text), &query.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("list_users", &e))?;

        rows.iter().map(row_to_user).collect()
    }

    async fn fetch_posts(&self, query: &SqlQuery) -> StorageResult<Vec<Post>> {
        let rows = bind_all(sqlx::query(&query.text), &query.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("list_posts_by_user", &e))?;

        rows.iter().map(row_to_post).collect()
    }

    async fn insert_post(&self, post: NewPost) -> StorageResult<Post> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| write_error("create_post", &e))?;

        let author = sqlx::query(&format!(
            "SELECT id FROM {USERS_TABLE} WHERE id = $1 FOR SHARE"
        ))
        .bind(post.user_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| read_error("create_post", &e))?;

        if author.is_none() {
            tx.rollback()
                .await
                .map_err(|e| write_error("create_post", &e))?;
            return Err(StorageError::user_reference_not_found(post.user_id));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO {POSTS_TABLE} (user_id, text) VALUES ($1, $2) RETURNING {POST_COLUMNS}"
        ))
        .bind(post.user_id.get())
        .bind(&post.text)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if foreign_key_violation(&e) {
                StorageError::user_reference_not_found(post.user_id)
            } else {
                write_error("create_post", &e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| write_error("create_post", &e))?;

        row_to_post(&row)
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StorageError::internal(format!("column {name}: {e}")))
}

fn row_to_user(row: &PgRow) -> StorageResult<User> {
    Ok(User {
        id: UserId(column(row, "id")?),
        login: column(row, "login")?,
        full_name: column(row, "full_name")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn row_to_post(row: &PgRow) -> StorageResult<Post> {
    Ok(Post {
        id: PostId(column(row, "id")?),
        user_id: UserId(column(row, "user_id")?),
        text: column(row, "text")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.clone()),
            SqlParam::BigInt(value) => query.bind(*value),
        };
    }
    query
}

// =============================================================================
// Error Mapping
// =============================================================================

fn database_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn foreign_key_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some(FOREIGN_KEY_VIOLATION)
}

fn is_connection_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}

fn read_error(operation: &'static str, err: &sqlx::Error) -> StorageError {
    if is_connection_failure(err) {
        return StorageError::connection(format!("{operation}: {err}"));
    }
    StorageError::read(operation, err.to_string())
}

fn write_error(operation: &'static str, err: &sqlx::Error) -> StorageError {
    if is_connection_failure(err) {
        return StorageError::connection(format!("{operation}: {err}"));
    }
    StorageError::write(operation, err.to_string())
}

// =============================================================================
// Repository Implementation
// =============================================================================

#[async_trait]
impl Repository for PostgresRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!("postgres pool closed");
        }
        Ok(())
    }

    async fn create_user(&self, ctx: &OpContext, user: NewUser) -> StorageResult<User> {
        validate_new_user(&user)?;

        ctx.run("create_user", self.op_timeout, async {
            let row = sqlx::query(&format!(
                "INSERT INTO {USERS_TABLE} (login, full_name) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
            ))
            .bind(&user.login)
            .bind(&user.full_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match database_code(&e).as_deref() {
                Some(UNIQUE_VIOLATION) => StorageError::LoginTaken {
                    login: user.login.clone(),
                },
                _ => write_error("create_user", &e),
            })?;

            let created = row_to_user(&row)?;
            tracing::debug!(user_id = created.id.get(), "user created");
            Ok(created)
        })
        .await
    }

    async fn get_user_by_id(&self, ctx: &OpContext, id: UserId) -> StorageResult<User> {
        ctx.run("get_user_by_id", self.op_timeout, async {
            let row = sqlx::query(&format!(
                "SELECT {USER_COLUMNS} FROM {USERS_TABLE} WHERE id = $1"
            ))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("get_user_by_id", &e))?;

            match row {
                Some(row) => {
                    let user = row_to_user(&row)?;
                    // Postcondition
                    debug_assert_eq!(user.id, id, "returned user must match requested id");
                    Ok(user)
                }
                None => Err(StorageError::user_not_found(id)),
            }
        })
        .await
    }

    async fn list_users(&self, ctx: &OpContext, query: &UserListQuery) -> StorageResult<Vec<User>> {
        let rendered = sql::select_users(query);

        ctx.run("list_users", self.op_timeout, async {
            let users = self.fetch_users(&rendered).await?;
            tracing::debug!(count = users.len(), "users listed");
            Ok(users)
        })
        .await
    }

    async fn create_post(&self, ctx: &OpContext, post: NewPost) -> StorageResult<Post> {
        validate_new_post(&post)?;
        let user_id = post.user_id;

        ctx.run("create_post", self.op_timeout, async {
            let created = self.insert_post(post).await?;
            tracing::debug!(user_id = user_id.get(), post_id = created.id.get(), "post created");
            Ok(created)
        })
        .await
    }

    async fn list_posts_by_user(
        &self,
        ctx: &OpContext,
        query: &PostListQuery,
    ) -> StorageResult<Vec<Post>> {
        let rendered = sql::select_posts(query);

        ctx.run("list_posts_by_user", self.op_timeout, async {
            let posts = self.fetch_posts(&rendered).await?;
            tracing::debug!(count = posts.len(), "posts listed");
            Ok(posts)
        })
        .await
    }

    async fn check_user_exists(&self, ctx: &OpContext, id: UserId) -> StorageResult<()> {
        ctx.run("check_user_exists", self.op_timeout, async {
            let exists: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS (SELECT 1 FROM {USERS_TABLE} WHERE id = $1)"
            ))
            .bind(id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error("check_user_exists", &e))?;

            if exists {
                Ok(())
            } else {
                Err(StorageError::user_not_found(id))
            }
        })
        .await
    }
}

// =============================================================================
// Tests (require running Postgres)
// =============================================================================

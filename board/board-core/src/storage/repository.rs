//! The repository capability set shared by every backend.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::OpContext;
use crate::model::{NewPost, NewUser, Post, User, UserId};
use crate::query::{PostListQuery, UserListQuery};

use super::error::{StorageError, StorageResult};

/// Which storage technology backs a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PostgreSQL via sqlx
    Postgres,
    /// MongoDB
    Mongo,
    /// In-process simulation
    Memory,
}

impl BackendKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mongo => "mongo",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" | "sim" => Ok(Self::Memory),
            other => Err(StorageError::invalid(
                "backend",
                format!("unknown backend {other:?}; expected postgres, mongo or memory"),
            )),
        }
    }
}

/// Users-and-posts storage.
///
/// Implementations must agree on error semantics:
/// - a missing entity is [`StorageError::NotFound`], never a driver error;
/// - a post whose author does not exist is [`StorageError::ReferenceNotFound`]
///   and nothing is written;
/// - a duplicate login is [`StorageError::LoginTaken`];
/// - every data operation honors the [`OpContext`] deadline and cancellation.
#[async_trait]
pub trait Repository: Send + Sync {
    /// The backing technology.
    fn backend(&self) -> BackendKind;

    /// Release connections. Calling it again is harmless.
    async fn close(&self) -> StorageResult<()>;

    /// Insert a user; the store assigns `id` and `created_at`.
    async fn create_user(&self, ctx: &OpContext, user: NewUser) -> StorageResult<User>;

    /// Fetch one user.
    async fn get_user_by_id(&self, ctx: &OpContext, id: UserId) -> StorageResult<User>;

    /// Filtered, ordered, paginated user listing.
    async fn list_users(&self, ctx: &OpContext, query: &UserListQuery) -> StorageResult<Vec<User>>;

    /// Insert a post after verifying its author exists, atomically.
    async fn create_post(&self, ctx: &OpContext, post: NewPost) -> StorageResult<Post>;

    /// Filtered, paginated post listing ordered by id.
    async fn list_posts_by_user(
        &self,
        ctx: &OpContext,
        query: &PostListQuery,
    ) -> StorageResult<Vec<Post>>;

    /// Every user, ordered by id.
    async fn list_all_users(&self, ctx: &OpContext) -> StorageResult<Vec<User>> {
        self.list_users(ctx, &UserListQuery::all()).await
    }

    /// Succeeds if the user exists, otherwise [`StorageError::NotFound`].
    async fn check_user_exists(&self, ctx: &OpContext, id: UserId) -> StorageResult<()>;
}

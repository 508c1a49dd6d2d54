//! MongoRepository - Document Storage
//!
//! TigerStyle: integer ids, native queries, no lossy id conversion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MongoRepository                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Client: mongodb::Client (pooled)                            │
//! │  users    { _id: i64, login, fullName, createdAt }           │
//! │  posts    { _id: i64, userId, text, createdAt }              │
//! │  counters { _id: "users" | "posts", seq: i64 }               │
//! │  Index: UNIQUE on users.login, ascending on posts.userId     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are drawn from `counters` with an atomic `$inc` upsert, so the same
//! integer id model holds for every backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONNECT_TIMEOUT_MS_DEFAULT, COUNTERS_COLLECTION, DOCUMENT_DATABASE_DEFAULT,
    OPERATION_TIMEOUT_MS_DEFAULT, POOL_CONNECTIONS_COUNT_DEFAULT, POSTS_TABLE, USERS_TABLE,
};
use crate::context::OpContext;
use crate::model::{NewPost, NewUser, Post, PostId, User, UserId};
use crate::query::document::{self, fields, DocumentQuery};
use crate::query::{validate_new_post, validate_new_user, PostListQuery, UserListQuery};

use super::error::{StorageError, StorageResult};
use super::repository::{BackendKind, Repository};

/// Server error code for a duplicate key.
const DUPLICATE_KEY: i32 = 11_000;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// `mongodb://` or `mongodb+srv://` URI
    pub uri: String,
    /// Database holding the collections
    pub database: String,
    /// Pool size
    pub max_connections: u32,
    /// Time allowed to connect or select a server
    pub connect_timeout: Duration,
    /// Per-operation budget
    pub op_timeout: Duration,
}

impl MongoConfig {
    /// Defaults for everything but the URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: DOCUMENT_DATABASE_DEFAULT.to_string(),
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT),
            op_timeout: Duration::from_millis(OPERATION_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Use another database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }
}

// =============================================================================
// Stored Documents
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: i64,
    login: String,
    #[serde(rename = "fullName")]
    full_name: String,
    #[serde(
        rename = "createdAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    created_at: DateTime<Utc>,
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        Self {
            id: UserId(doc.id),
            login: doc.login,
            full_name: doc.full_name,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostDocument {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(rename = "userId")]
    user_id: i64,
    text: String,
    #[serde(
        rename = "createdAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    created_at: DateTime<Utc>,
}

impl From<PostDocument> for Post {
    fn from(doc: PostDocument) -> Self {
        Self {
            id: PostId(doc.id),
            user_id: UserId(doc.user_id),
            text: doc.text,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CounterDocument {
    seq: i64,
}

/// Current time truncated to what a BSON datetime can hold.
fn now_millis() -> DateTime<Utc> {
    bson::DateTime::now().to_chrono()
}

// =============================================================================
// MongoRepository
// =============================================================================

/// MongoDB repository.
pub struct MongoRepository {
    client: Client,
    users: Collection<UserDocument>,
    posts: Collection<PostDocument>,
    counters: Collection<CounterDocument>,
    op_timeout: Duration,
    closed: AtomicBool,
}

impl MongoRepository {
    /// Connect, ping, and ensure indexes exist.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] for a malformed URI or empty
    /// database name, and [`StorageError::Connection`] if the server cannot
    /// be reached.
    pub async fn connect(config: MongoConfig) -> StorageResult<Self> {
        if config.database.trim().is_empty() {
            return Err(StorageError::invalid("database_name", "must not be empty"));
        }

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StorageError::invalid("database_url", e.to_string()))?;
        options.max_pool_size = Some(config.max_connections);
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options)
            .map_err(|e| StorageError::connection(format!("failed to create client: {e}")))?;
        let database = client.database(&config.database);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        let repo = Self::from_database(client, &database, config.op_timeout);
        repo.ensure_indexes().await?;

        tracing::info!(database = %config.database, "connected to mongo");
        Ok(repo)
    }

    fn from_database(client: Client, database: &Database, op_timeout: Duration) -> Self {
        Self {
            users: database.collection(USERS_TABLE),
            posts: database.collection(POSTS_TABLE),
            counters: database.collection(COUNTERS_COLLECTION),
            client,
            op_timeout,
            closed: AtomicBool::new(false),
        }
    }

    async fn ensure_indexes(&self) -> StorageResult<()> {
        let unique_login = IndexModel::builder()
            .keys(doc! { fields::LOGIN: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users
            .create_index(unique_login)
            .await
            .map_err(|e| StorageError::internal(format!("failed to create login index: {e}")))?;

        let by_author = IndexModel::builder()
            .keys(doc! { fields::USER_ID: 1 })
            .build();
        self.posts
            .create_index(by_author)
            .await
            .map_err(|e| StorageError::internal(format!("failed to create userId index: {e}")))?;

        Ok(())
    }

    /// Next id for `sequence`, starting at 1.
    async fn next_id(&self, operation: &'static str, sequence: &str) -> StorageResult<i64> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { fields::ID: sequence },
                doc! { "$inc": { fields::SEQ: 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| write_error(operation, &e))?
            .ok_or_else(|| StorageError::internal(format!("counter {sequence} missing after upsert")))?;

        // Postcondition
        debug_assert!(counter.seq > 0, "counter must be positive");
        Ok(counter.seq)
    }

    async fn find_user(&self, operation: &'static str, id: UserId) -> StorageResult<Option<UserDocument>> {
        self.users
            .find_one(doc! { fields::ID: id.get() })
            .await
            .map_err(|e| read_error(operation, &e))
    }

    async fn find_many<T>(
        collection: &Collection<T>,
        operation: &'static str,
        query: DocumentQuery,
    ) -> StorageResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync + Unpin,
    {
        // A zero limit means "no limit" to the server.
        if query.is_empty_page() {
            return Ok(Vec::new());
        }

        let mut options = FindOptions::default();
        options.sort = Some(query.sort);
        options.skip = query.skip;
        options.limit = query.limit;

        let cursor = collection
            .find(query.filter)
            .with_options(options)
            .await
            .map_err(|e| read_error(operation, &e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| read_error(operation, &e))
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn is_connection_failure(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. }
    )
}

fn read_error(operation: &'static str, err: &mongodb::error::Error) -> StorageError {
    if is_connection_failure(err) {
        return StorageError::connection(format!("{operation}: {err}"));
    }
    StorageError::read(operation, err.to_string())
}

fn write_error(operation: &'static str, err: &mongodb::error::Error) -> StorageError {
    if is_connection_failure(err) {
        return StorageError::connection(format!("{operation}: {err}"));
    }
    StorageError::write(operation, err.to_string())
}

// =============================================================================
// Repository Implementation
// =============================================================================

#[async_trait]
impl Repository for MongoRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
            tracing::info!("mongo client shut down");
        }
        Ok(())
    }

    async fn create_user(&self, ctx: &OpContext, user: NewUser) -> StorageResult<User> {
        validate_new_user(&user)?;

        ctx.run("create_user", self.op_timeout, async {
            // Checked up front so a duplicate does not burn a counter value.
            let taken = self
                .users
                .find_one(doc! { fields::LOGIN: user.login.as_str() })
                .await
                .map_err(|e| read_error("create_user", &e))?;
            if taken.is_some() {
                return Err(StorageError::LoginTaken { login: user.login });
            }

            let stored = UserDocument {
                id: self.next_id("create_user", USERS_TABLE).await?,
                login: user.login,
                full_name: user.full_name,
                created_at: now_millis(),
            };

            // The unique index still settles a concurrent race.
            self.users.insert_one(&stored).await.map_err(|e| {
                if is_duplicate_key(&e) {
                    StorageError::LoginTaken {
                        login: stored.login.clone(),
                    }
                } else {
                    write_error("create_user", &e)
                }
            })?;

            tracing::debug!(user_id = stored.id, "user created");
            Ok(User::from(stored))
        })
        .await
    }

    async fn get_user_by_id(&self, ctx: &OpContext, id: UserId) -> StorageResult<User> {
        ctx.run("get_user_by_id", self.op_timeout, async {
            self.find_user("get_user_by_id", id)
                .await?
                .map(User::from)
                .ok_or_else(|| StorageError::user_not_found(id))
        })
        .await
    }

    async fn list_users(&self, ctx: &OpContext, query: &UserListQuery) -> StorageResult<Vec<User>> {
        let rendered = document::find_users(query);

        ctx.run("list_users", self.op_timeout, async {
            let found = Self::find_many(&self.users, "list_users", rendered).await?;
            tracing::debug!(count = found.len(), "users listed");
            Ok(found.into_iter().map(User::from).collect())
        })
        .await
    }

    async fn create_post(&self, ctx: &OpContext, post: NewPost) -> StorageResult<Post> {
        validate_new_post(&post)?;

        // Users are never deleted, so the author cannot vanish between the
        // check and the insert.
        ctx.run("create_post", self.op_timeout, async {
            if self.find_user("create_post", post.user_id).await?.is_none() {
                return Err(StorageError::user_reference_not_found(post.user_id));
            }

            let stored = PostDocument {
                id: self.next_id("create_post", POSTS_TABLE).await?,
                user_id: post.user_id.get(),
                text: post.text,
                created_at: now_millis(),
            };
            self.posts
                .insert_one(&stored)
                .await
                .map_err(|e| write_error("create_post", &e))?;

            tracing::debug!(user_id = stored.user_id, post_id = stored.id, "post created");
            Ok(Post::from(stored))
        })
        .await
    }

    async fn list_posts_by_user(
        &self,
        ctx: &OpContext,
        query: &PostListQuery,
    ) -> StorageResult<Vec<Post>> {
        let rendered = document::find_posts(query);

        ctx.run("list_posts_by_user", self.op_timeout, async {
            let found = Self::find_many(&self.posts, "list_posts_by_user", rendered).await?;
            tracing::debug!(count = found.len(), "posts listed");
            Ok(found.into_iter().map(Post::from).collect())
        })
        .await
    }

    async fn check_user_exists(&self, ctx: &OpContext, id: UserId) -> StorageResult<()> {
        ctx.run("check_user_exists", self.op_timeout, async {
            match self.find_user("check_user_exists", id).await? {
                Some(_) => Ok(()),
                None => Err(StorageError::user_not_found(id)),
            }
        })
        .await
    }
}

// =============================================================================
// Tests (require running MongoDB)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Get test server URI from environment.
    fn test_mongo_uri() -> Option<String> {
        env::var("TEST_MONGO_URI").ok()
    }

    /// Skip test if no server available.
    macro_rules! require_db {
        () => {
            match test_mongo_uri() {
                Some(uri) => uri,
                None => {
                    eprintln!("Skipping test: TEST_MONGO_URI not set");
                    return;
                }
            }
        };
    }

    fn unique_login(prefix: &str) -> String {
        format!(
            "{prefix}-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    async fn connect(uri: String) -> MongoRepository {
        MongoRepository::connect(MongoConfig::new(uri).with_database("postboard_test"))
            .await
            .unwrap()
    }

    #[test]
    fn test_documents_use_camel_case_fields() {
        let stored = UserDocument {
            id: 3,
            login: "yan".into(),
            full_name: "Yan Doe".into(),
            created_at: now_millis(),
        };
        let doc = bson::to_document(&stored).unwrap();
        assert_eq!(doc.get_i64("_id").unwrap(), 3);
        assert_eq!(doc.get_str("fullName").unwrap(), "Yan Doe");
        assert!(doc.get_datetime("createdAt").is_ok());

        let user = User::from(stored.clone());
        assert_eq!(user.id, UserId(3));
        assert_eq!(user.created_at, stored.created_at);
    }

    #[test]
    fn test_timestamps_survive_bson_round_trip() {
        let created_at = now_millis();
        let stored = PostDocument {
            id: 1,
            user_id: 2,
            text: "hi".into(),
            created_at,
        };
        let decoded: PostDocument = bson::from_document(bson::to_document(&stored).unwrap()).unwrap();
        assert_eq!(decoded.created_at, created_at);
    }

    #[tokio::test]
    async fn test_mongo_user_round_trip() {
        let uri = require_db!();
        let repo = connect(uri).await;
        let ctx = OpContext::background();
        let login = unique_login("yan");

        let created = repo
            .create_user(&ctx, NewUser::new(login.clone(), "Yan Doe"))
            .await
            .unwrap();
        assert!(created.id.get() > 0);

        let fetched = repo.get_user_by_id(&ctx, created.id).await.unwrap();
        assert_eq!(fetched, created);

        let err = repo
            .create_user(&ctx, NewUser::new(login.clone(), "Other"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::LoginTaken { login });

        repo.close().await.unwrap();
        repo.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mongo_posts() {
        let uri = require_db!();
        let repo = connect(uri).await;
        let ctx = OpContext::background();

        let author = repo
            .create_user(&ctx, NewUser::new(unique_login("poster"), "Poster"))
            .await
            .unwrap();
        for i in 0..3 {
            repo.create_post(&ctx, NewPost::new(author.id, format!("post {i}")))
                .await
                .unwrap();
        }

        let posts = repo
            .list_posts_by_user(&ctx, &PostListQuery::by_user(author.id))
            .await
            .unwrap();
        assert_eq!(posts.len(), 3);
        assert!(posts.windows(2).all(|w| w[0].id < w[1].id));

        let err = repo
            .create_post(&ctx, NewPost::new(UserId(i64::MAX), "orphan"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::user_reference_not_found(UserId(i64::MAX)));

        repo.close().await.unwrap();
    }
}

//! SimRepository - In-Memory Storage for Testing
//!
//! TigerStyle: simulation-first. Same contract as the real backends, plus
//! injectable latency and outages so deadline and failure paths can be
//! exercised without a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::constants::OPERATION_TIMEOUT_MS_DEFAULT;
use crate::context::OpContext;
use crate::model::{NewPost, NewUser, Post, PostId, User, UserId};
use crate::query::{validate_new_post, validate_new_user, PostListQuery, UserListQuery, UserOrder};

use super::error::{StorageError, StorageResult};
use super::repository::{BackendKind, Repository};

// =============================================================================
// Faults
// =============================================================================

/// Injected misbehavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Delay applied inside every data operation
    pub latency: Duration,
    /// Fail every data operation with a connection error
    pub unavailable: bool,
}

impl SimFaults {
    /// Slow every operation down by `latency`.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail every operation.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

// =============================================================================
// SimRepository
// =============================================================================

#[derive(Debug, Default)]
struct SimState {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    next_user_id: i64,
    next_post_id: i64,
}

/// In-memory repository.
///
/// Ids start at 1 and are never reused. `create_post` holds the write lock
/// across the author check and the insert.
#[derive(Debug)]
pub struct SimRepository {
    state: RwLock<SimState>,
    faults: SimFaults,
    op_timeout: Duration,
    closed: AtomicBool,
}

impl SimRepository {
    /// Empty repository with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(SimFaults::default())
    }

    /// Empty repository with injected faults.
    #[must_use]
    pub fn with_faults(faults: SimFaults) -> Self {
        Self {
            state: RwLock::new(SimState {
                next_user_id: 1,
                next_post_id: 1,
                ..SimState::default()
            }),
            faults,
            op_timeout: Duration::from_millis(OPERATION_TIMEOUT_MS_DEFAULT),
            closed: AtomicBool::new(false),
        }
    }

    /// Override the per-operation timeout.
    #[must_use]
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn inject(&self, operation: &'static str) -> StorageResult<()> {
        tracing::trace!(operation, "sim operation");
        if self.is_closed() {
            return Err(StorageError::connection(format!(
                "{operation}: repository is closed"
            )));
        }
        if !self.faults.latency.is_zero() {
            tokio::time::sleep(self.faults.latency).await;
        }
        if self.faults.unavailable {
            return Err(StorageError::connection(format!(
                "{operation}: simulated outage"
            )));
        }
        Ok(())
    }
}

impl Default for SimRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_users(users: &mut [&User], order: UserOrder) {
    match order {
        UserOrder::Id => users.sort_by_key(|u| u.id),
        UserOrder::CreatedAt => users.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
        }),
        UserOrder::Login => users.sort_by(|a, b| a.login.cmp(&b.login).then(a.id.cmp(&b.id))),
    }
}

#[async_trait]
impl Repository for SimRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_user(&self, ctx: &OpContext, user: NewUser) -> StorageResult<User> {
        validate_new_user(&user)?;

        ctx.run("create_user", self.op_timeout, async {
            self.inject("create_user").await?;
            let mut state = self.state.write().await;

            if state.users.values().any(|u| u.login == user.login) {
                return Err(StorageError::LoginTaken { login: user.login });
            }

            let id = UserId(state.next_user_id);
            state.next_user_id += 1;

            let created = User {
                id,
                login: user.login,
                full_name: user.full_name,
                created_at: Utc::now(),
            };
            state.users.insert(id, created.clone());
            tracing::debug!(user_id = id.get(), "user created");

            // Postcondition
            debug_assert!(id.get() > 0, "assigned id must be positive");
            Ok(created)
        })
        .await
    }

    async fn get_user_by_id(&self, ctx: &OpContext, id: UserId) -> StorageResult<User> {
        ctx.run("get_user_by_id", self.op_timeout, async {
            self.inject("get_user_by_id").await?;
            let state = self.state.read().await;
            state
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::user_not_found(id))
        })
        .await
    }

    async fn list_users(&self, ctx: &OpContext, query: &UserListQuery) -> StorageResult<Vec<User>> {
        ctx.run("list_users", self.op_timeout, async {
            self.inject("list_users").await?;
            let state = self.state.read().await;

            let mut matched: Vec<&User> = state
                .users
                .values()
                .filter(|u| query.login.as_ref().map_or(true, |login| &u.login == login))
                .collect();
            sort_users(&mut matched, query.order);

            Ok(query.page.apply(matched.into_iter().cloned()))
        })
        .await
    }

    async fn create_post(&self, ctx: &OpContext, post: NewPost) -> StorageResult<Post> {
        validate_new_post(&post)?;

        ctx.run("create_post", self.op_timeout, async {
            self.inject("create_post").await?;
            let mut state = self.state.write().await;

            if !state.users.contains_key(&post.user_id) {
                return Err(StorageError::user_reference_not_found(post.user_id));
            }

            let id = PostId(state.next_post_id);
            state.next_post_id += 1;

            let created = Post {
                id,
                user_id: post.user_id,
                text: post.text,
                created_at: Utc::now(),
            };
            state.posts.insert(id, created.clone());
            tracing::debug!(user_id = post.user_id.get(), post_id = id.get(), "post created");
            Ok(created)
        })
        .await
    }

    async fn list_posts_by_user(
        &self,
        ctx: &OpContext,
        query: &PostListQuery,
    ) -> StorageResult<Vec<Post>> {
        ctx.run("list_posts_by_user", self.op_timeout, async {
            self.inject("list_posts_by_user").await?;
            let state = self.state.read().await;

            // BTreeMap iteration is already id order.
            let matched = state
                .posts
                .values()
                .filter(|p| query.user_id.map_or(true, |user_id| p.user_id == user_id))
                .cloned();

            Ok(query.page.apply(matched))
        })
        .await
    }

    async fn check_user_exists(&self, ctx: &OpContext, id: UserId) -> StorageResult<()> {
        ctx.run("check_user_exists", self.op_timeout, async {
            self.inject("check_user_exists").await?;
            let state = self.state.read().await;
            if state.users.contains_key(&id) {
                Ok(())
            } else {
                Err(StorageError::user_not_found(id))
            }
        })
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================

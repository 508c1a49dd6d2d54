//! HTTP API
//!
//! ```text
//! POST /users        create_user
//! GET  /users        list_users      (login, orderBy, limit, offset)
//! GET  /users/all    list_all_users
//! GET  /users/:id    get_user_by_id
//! POST /posts        create_post
//! GET  /posts        list_posts_by_user (userId, limit, offset)
//! GET  /health       liveness and backend name
//! ```

mod error;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use board_core::{OpContext, Repository};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorBody};
pub use handlers::HealthResponse;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn Repository>,
    op_timeout: Duration,
    shutdown: CancellationToken,
}

impl AppState {
    /// State over `repo`. Cancelling `shutdown` aborts in-flight storage calls.
    pub fn new(repo: Arc<dyn Repository>, op_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            repo,
            op_timeout,
            shutdown,
        }
    }

    /// Per-request context: bounded by the operation timeout and tied to
    /// server shutdown.
    fn context(&self) -> OpContext {
        OpContext::with_cancel(self.shutdown.child_token()).with_timeout(self.op_timeout)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/users/all", get(handlers::list_all_users))
        .route("/users/:id", get(handlers::get_user))
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

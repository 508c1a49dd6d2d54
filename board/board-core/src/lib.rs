//! Board Core - Users and Posts Storage
//!
//! Repository abstraction and query construction for the postboard service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  raw params (login, orderBy, limit, offset, userId)          │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  query::{UserListQuery, PostListQuery}   (validated)         │
//! │        │                                                     │
//! │        ├──► query::sql       ──► PostgresRepository          │
//! │        ├──► query::document  ──► MongoRepository             │
//! │        └──► (in-memory eval) ──► SimRepository               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every backend implements [`Repository`] with identical error semantics,
//! so callers hold an `Arc<dyn Repository>` chosen once at startup.
//!
//! # Usage
//!
//! ```rust
//! use board_core::{NewUser, OpContext, Repository, SimRepository, UserListParams, UserListQuery};
//!
//! # tokio_test::block_on(async {
//! let repo = SimRepository::new();
//! let ctx = OpContext::background();
//!
//! let user = repo
//!     .create_user(&ctx, NewUser::new("yan", "Yan Doe"))
//!     .await
//!     .unwrap();
//!
//! let params = UserListParams { login: Some("yan".into()), ..Default::default() };
//! let found = repo
//!     .list_users(&ctx, &UserListQuery::parse(&params).unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(found, vec![user]);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod context;
pub mod model;
pub mod query;
pub mod storage;

// Re-export common types
pub use constants::*;
pub use context::OpContext;
pub use model::{EntityKind, NewPost, NewUser, Post, PostId, User, UserId};
pub use query::{
    Page, PostListParams, PostListQuery, UserListParams, UserListQuery, UserOrder,
};
pub use storage::{
    connect, BackendKind, ConnectOptions, ErrorCategory, Repository, SimFaults, SimRepository,
    StorageError, StorageResult,
};

#[cfg(feature = "postgres")]
pub use storage::{PostgresConfig, PostgresRepository};

#[cfg(feature = "mongo")]
pub use storage::{MongoConfig, MongoRepository};

//! Storage - Repository Trait and Backends
//!
//! TigerStyle: one capability set, several interchangeable backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Repository Trait                         │
//! └─────────────────────────────────────────────────────────────┘
//!        ↑                      ↑                      ↑
//!        │                      │                      │
//! ┌──────┴───────┐     ┌────────┴─────────┐   ┌────────┴────────┐
//! │SimRepository │     │PostgresRepository│   │ MongoRepository │
//! │  (testing)   │     │   (relational)   │   │   (document)    │
//! └──────────────┘     └──────────────────┘   └─────────────────┘
//! ```
//!
//! The backend is chosen once at startup and never switched at runtime.

mod connect;
mod error;
mod repository;
mod sim;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "mongo")]
mod mongo;

pub use connect::{connect, ConnectOptions};
pub use error::{ErrorCategory, StorageError, StorageResult};
pub use repository::{BackendKind, Repository};
pub use sim::{SimFaults, SimRepository};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresRepository};

#[cfg(feature = "mongo")]
pub use mongo::{MongoConfig, MongoRepository};

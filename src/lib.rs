//! Postboard - Users and Posts over HTTP
//!
//! A JSON API for creating and listing users and their posts, backed by
//! PostgreSQL, MongoDB or an in-memory store chosen at startup. Storage lives
//! in `board-core`; this crate adds configuration, the router and the serve
//! loop.

pub mod config;
pub mod http;
pub mod server;

/// Application name
pub const APP_NAME: &str = "postboard";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

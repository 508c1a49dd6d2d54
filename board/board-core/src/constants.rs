//! Constants
//!
//! TigerStyle: limits and defaults named with their unit as the suffix.

/// Default per-operation timeout applied by every backend.
pub const OPERATION_TIMEOUT_MS_DEFAULT: u64 = 1_000;

/// Connect timeout for establishing a backend pool/client.
pub const CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3_000;

/// Default pool size for backends that pool connections.
pub const POOL_CONNECTIONS_COUNT_DEFAULT: u32 = 10;

/// Maximum login length in bytes.
pub const LOGIN_BYTES_MAX: usize = 255;

/// Maximum full name length in bytes.
pub const FULL_NAME_BYTES_MAX: usize = 1_024;

/// Maximum post text length in bytes.
pub const POST_TEXT_BYTES_MAX: usize = 65_536;

/// Relational table holding users.
pub const USERS_TABLE: &str = "users";

/// Relational table holding posts.
pub const POSTS_TABLE: &str = "posts";

/// Default document database name.
pub const DOCUMENT_DATABASE_DEFAULT: &str = "postboard";

/// Document collection holding per-collection id sequences.
pub const COUNTERS_COLLECTION: &str = "counters";

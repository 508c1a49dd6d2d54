//! Query Builder - Filters, Sort and Pagination
//!
//! Turns optional, string-typed request parameters into validated list
//! queries. A validated query holds no user text in a position where it could
//! be interpreted as query syntax: filter values are data, the sort column is
//! a closed enum and pagination is numeric.
//!
//! Rendering into a storage-specific descriptor lives in [`sql`] (relational)
//! and `document` (document store, behind the `mongo` feature).
//!
//! # Example
//!
//! ```rust
//! use board_core::query::{sql, UserListParams, UserListQuery};
//!
//! let params = UserListParams {
//!     login: Some("alice".into()),
//!     order_by: Some("createdAt".into()),
//!     limit: Some("10".into()),
//!     offset: None,
//! };
//! let query = UserListQuery::parse(&params).unwrap();
//! let rendered = sql::select_users(&query);
//! assert_eq!(
//!     rendered.text,
//!     "SELECT id, login, full_name, created_at FROM users \
//!      WHERE login = $1 ORDER BY created_at ASC, id ASC LIMIT $2"
//! );
//! ```

#[cfg(feature = "mongo")]
pub mod document;
pub mod sql;

use serde::Deserialize;

use crate::constants::{FULL_NAME_BYTES_MAX, LOGIN_BYTES_MAX, POST_TEXT_BYTES_MAX};
use crate::model::{NewPost, NewUser, UserId};
use crate::storage::{StorageError, StorageResult};

// =============================================================================
// Raw Parameters
// =============================================================================

/// Raw user list parameters as they arrive on the query string.
///
/// An empty string is treated the same as an absent parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListParams {
    /// Exact-match login filter
    pub login: Option<String>,
    /// Sort column: `createdAt`, `login` or `id`
    pub order_by: Option<String>,
    /// Maximum number of users to return
    pub limit: Option<String>,
    /// Number of users to skip
    pub offset: Option<String>,
}

/// Raw post list parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListParams {
    /// Exact-match author filter
    pub user_id: Option<String>,
    /// Maximum number of posts to return
    pub limit: Option<String>,
    /// Number of posts to skip
    pub offset: Option<String>,
}

// =============================================================================
// Validated Queries
// =============================================================================

/// Sortable user columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UserOrder {
    /// Insertion order
    #[default]
    Id,
    /// Creation time
    CreatedAt,
    /// Login, lexicographic
    Login,
}

impl UserOrder {
    /// Resolve a client-supplied column name against the allow-list.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] for anything not sortable.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "createdat" | "created_at" => Ok(Self::CreatedAt),
            "login" => Ok(Self::Login),
            _ => Err(StorageError::invalid(
                "orderBy",
                format!("cannot sort by {raw:?}; expected createdAt or login"),
            )),
        }
    }
}

/// Offset/limit window. `limit: None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Page {
    /// Maximum number of items
    pub limit: Option<u64>,
    /// Items to skip
    pub offset: u64,
}

impl Page {
    /// Parse raw limit/offset strings.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] when either value is not a
    /// non-negative integer that fits a signed 64-bit column.
    pub fn parse(limit: Option<&str>, offset: Option<&str>) -> StorageResult<Self> {
        Ok(Self {
            limit: parse_count("limit", limit)?,
            offset: parse_count("offset", offset)?.unwrap_or(0),
        })
    }

    /// Apply this window to an already ordered sequence.
    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        let skipped = items.skip(usize::try_from(self.offset).unwrap_or(usize::MAX));
        match self.limit {
            Some(limit) => skipped
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => skipped.collect(),
        }
    }
}

/// A validated user listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListQuery {
    /// Exact login, if filtering
    pub login: Option<String>,
    /// Primary sort column; ties are always broken by id
    pub order: UserOrder,
    /// Pagination window
    pub page: Page,
}

impl UserListQuery {
    /// The unfiltered, id-ordered listing.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Validate raw parameters.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] for a bad `orderBy`,
    /// `limit` or `offset`.
    pub fn parse(params: &UserListParams) -> StorageResult<Self> {
        let order = match present(params.order_by.as_deref()) {
            Some(raw) => UserOrder::parse(raw)?,
            None => UserOrder::default(),
        };

        Ok(Self {
            login: present(params.login.as_deref()).map(str::to_string),
            order,
            page: Page::parse(
                present(params.limit.as_deref()),
                present(params.offset.as_deref()),
            )?,
        })
    }
}

/// A validated post listing, always ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListQuery {
    /// Author, if filtering
    pub user_id: Option<UserId>,
    /// Pagination window
    pub page: Page,
}

impl PostListQuery {
    /// Posts by one author, unpaginated.
    #[must_use]
    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            page: Page::default(),
        }
    }

    /// Validate raw parameters.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidParameter`] for a non-integer `userId`
    /// or a bad `limit`/`offset`.
    pub fn parse(params: &PostListParams) -> StorageResult<Self> {
        let user_id = match present(params.user_id.as_deref()) {
            Some(raw) => Some(UserId(raw.trim().parse::<i64>().map_err(|e| {
                StorageError::invalid("userId", format!("{raw:?} is not an integer id: {e}"))
            })?)),
            None => None,
        };

        Ok(Self {
            user_id,
            page: Page::parse(
                present(params.limit.as_deref()),
                present(params.offset.as_deref()),
            )?,
        })
    }
}

// =============================================================================
// Payload Validation
// =============================================================================

/// Check a user payload before it reaches a backend.
///
/// # Errors
/// Returns [`StorageError::InvalidParameter`] for an empty or oversized field.
pub fn validate_new_user(user: &NewUser) -> StorageResult<()> {
    require_text("login", &user.login, LOGIN_BYTES_MAX)?;
    require_text("fullName", &user.full_name, FULL_NAME_BYTES_MAX)
}

/// Check a post payload before it reaches a backend.
///
/// # Errors
/// Returns [`StorageError::InvalidParameter`] for an empty or oversized text.
pub fn validate_new_post(post: &NewPost) -> StorageResult<()> {
    require_text("text", &post.text, POST_TEXT_BYTES_MAX)
}

// =============================================================================
// Helpers
// =============================================================================

fn present(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.trim().is_empty())
}

fn parse_count(name: &'static str, raw: Option<&str>) -> StorageResult<Option<u64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let value = raw.trim().parse::<u64>().map_err(|e| {
        StorageError::invalid(name, format!("{raw:?} is not a non-negative integer: {e}"))
    })?;

    if i64::try_from(value).is_err() {
        return Err(StorageError::invalid(
            name,
            format!("{value} exceeds {}", i64::MAX),
        ));
    }

    Ok(Some(value))
}

fn require_text(name: &'static str, value: &str, bytes_max: usize) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::invalid(name, "must not be empty"));
    }
    if value.len() > bytes_max {
        return Err(StorageError::invalid(
            name,
            format!("{} bytes exceeds max {bytes_max}", value.len()),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

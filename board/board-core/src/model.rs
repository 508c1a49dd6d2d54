//! Entity Model - Users and Posts
//!
//! Plain records shared by every backend. Identifiers and timestamps are
//! always assigned by the storage engine; the `New*` types carry only the
//! client-supplied fields, so a client can never choose them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Store-generated user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Store-generated post identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl UserId {
    /// Raw integer value.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl PostId {
    /// Raw integer value.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which entity an error or lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A [`User`].
    User,
    /// A [`Post`].
    Post,
}

impl EntityKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// User
// =============================================================================

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-generated identifier
    pub id: UserId,
    /// Login, unique across users
    pub login: String,
    /// Display name
    pub full_name: String,
    /// Creation timestamp, assigned by the store
    pub created_at: DateTime<Utc>,
}

/// Client-supplied fields for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Requested login
    pub login: String,
    /// Display name
    pub full_name: String,
}

impl NewUser {
    /// Create a new user payload.
    #[must_use]
    pub fn new(login: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            full_name: full_name.into(),
        }
    }
}

// =============================================================================
// Post
// =============================================================================

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Store-generated identifier
    pub id: PostId,
    /// Author
    pub user_id: UserId,
    /// Body
    pub text: String,
    /// Creation timestamp, assigned by the store
    pub created_at: DateTime<Utc>,
}

/// Client-supplied fields for creating a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    /// Author; must reference an existing user
    pub user_id: UserId,
    /// Body
    pub text: String,
}

impl NewPost {
    /// Create a new post payload.
    #[must_use]
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_json_is_camel_case() {
        let user = User {
            id: UserId(1),
            login: "yan".to_string(),
            full_name: "Yan Doe".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["fullName"], "Yan Doe");
        assert_eq!(json["createdAt"], "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_new_post_ignores_server_fields() {
        let post: NewPost = serde_json::from_str(
            r#"{"id": 99, "userId": 1, "text": "hello", "createdAt": "2000-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(post, NewPost::new(UserId(1), "hello"));
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::User.to_string(), "user");
        assert_eq!(EntityKind::Post.to_string(), "post");
    }
}

//! Document-store rendering (MongoDB).
//!
//! The same validated queries as [`super::sql`], expressed as native
//! filter/sort/skip/limit options instead of query text.

use bson::{doc, Document};

use super::{Page, PostListQuery, UserListQuery, UserOrder};

/// Stored field names.
pub mod fields {
    /// Document identifier (integer, from the counters collection)
    pub const ID: &str = "_id";
    /// User login
    pub const LOGIN: &str = "login";
    /// User display name
    pub const FULL_NAME: &str = "fullName";
    /// Creation timestamp
    pub const CREATED_AT: &str = "createdAt";
    /// Post author
    pub const USER_ID: &str = "userId";
    /// Post body
    pub const TEXT: &str = "text";
    /// Counter value in the counters collection
    pub const SEQ: &str = "seq";
}

/// Native find options for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// Match filter
    pub filter: Document,
    /// Sort specification, in priority order
    pub sort: Document,
    /// Documents to skip
    pub skip: Option<u64>,
    /// Maximum documents; `Some(0)` means an empty page, not "no limit"
    pub limit: Option<i64>,
}

impl DocumentQuery {
    /// Whether the window is empty and the store need not be queried.
    ///
    /// MongoDB reads a zero limit as "unbounded".
    #[must_use]
    pub fn is_empty_page(&self) -> bool {
        self.limit == Some(0)
    }
}

/// Render a user listing.
#[must_use]
pub fn find_users(query: &UserListQuery) -> DocumentQuery {
    let filter = match &query.login {
        Some(login) => doc! { fields::LOGIN: login.as_str() },
        None => Document::new(),
    };

    let sort = match query.order {
        UserOrder::Id => doc! { fields::ID: 1 },
        order => doc! { order_field(order): 1, fields::ID: 1 },
    };

    window(filter, sort, query.page)
}

/// Render a post listing.
#[must_use]
pub fn find_posts(query: &PostListQuery) -> DocumentQuery {
    let filter = match query.user_id {
        Some(user_id) => doc! { fields::USER_ID: user_id.get() },
        None => Document::new(),
    };

    window(filter, doc! { fields::ID: 1 }, query.page)
}

/// Field backing a sort key.
#[must_use]
pub fn order_field(order: UserOrder) -> &'static str {
    match order {
        UserOrder::Id => fields::ID,
        UserOrder::CreatedAt => fields::CREATED_AT,
        UserOrder::Login => fields::LOGIN,
    }
}

fn window(filter: Document, sort: Document, page: Page) -> DocumentQuery {
    DocumentQuery {
        filter,
        sort,
        skip: (page.offset > 0).then_some(page.offset),
        limit: page
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::query::UserListParams;

    #[test]
    fn test_find_all_users() {
        let query = find_users(&UserListQuery::all());
        assert!(query.filter.is_empty());
        assert_eq!(query.sort, doc! { "_id": 1 });
        assert_eq!(query.skip, None);
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_find_users_mirrors_sql_semantics() {
        let query = UserListQuery::parse(&UserListParams {
            login: Some("alice".to_string()),
            order_by: Some("createdAt".to_string()),
            limit: Some("2".to_string()),
            offset: Some("1".to_string()),
        })
        .unwrap();

        let rendered = find_users(&query);
        assert_eq!(rendered.filter, doc! { "login": "alice" });
        assert_eq!(rendered.sort, doc! { "createdAt": 1, "_id": 1 });
        assert_eq!(rendered.skip, Some(1));
        assert_eq!(rendered.limit, Some(2));

        let keys: Vec<&str> = rendered.sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["createdAt", "_id"]);
    }

    #[test]
    fn test_find_posts_by_user() {
        let rendered = find_posts(&PostListQuery::by_user(UserId(5)));
        assert_eq!(rendered.filter, doc! { "userId": 5_i64 });
        assert_eq!(rendered.sort, doc! { "_id": 1 });
    }

    #[test]
    fn test_zero_limit_is_empty_page() {
        let query = UserListQuery {
            page: Page { limit: Some(0), offset: 0 },
            ..UserListQuery::all()
        };
        assert!(find_users(&query).is_empty_page());
        assert!(!find_users(&UserListQuery::all()).is_empty_page());
    }
}

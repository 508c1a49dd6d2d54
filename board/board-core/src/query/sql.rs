//! SQL rendering for PostgreSQL.
//!
//! Query text is assembled only from `&'static str` fragments; every value,
//! including LIMIT and OFFSET, is bound as a `$n` parameter.

use crate::constants::{POSTS_TABLE, USERS_TABLE};

use super::{Page, PostListQuery, UserListQuery, UserOrder};

/// Column list selected for users, in row-mapping order.
pub const USER_COLUMNS: &str = "id, login, full_name, created_at";

/// Column list selected for posts, in row-mapping order.
pub const POST_COLUMNS: &str = "id, user_id, text, created_at";

/// A value bound to a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// TEXT value
    Text(String),
    /// BIGINT value
    BigInt(i64),
}

/// Executable SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    /// Statement text with `$1..$n` placeholders
    pub text: String,
    /// Values for the placeholders
    pub params: Vec<SqlParam>,
}

/// Render a user listing.
#[must_use]
pub fn select_users(query: &UserListQuery) -> SqlQuery {
    let mut sql = SqlBuilder::new(format!("SELECT {USER_COLUMNS} FROM {USERS_TABLE}"));

    if let Some(login) = &query.login {
        sql.push(" WHERE login = ");
        sql.bind(SqlParam::Text(login.clone()));
    }

    match query.order {
        UserOrder::Id => sql.push(" ORDER BY id ASC"),
        order => {
            sql.push(" ORDER BY ");
            sql.push(order_column(order));
            sql.push(" ASC, id ASC");
        }
    }

    sql.page(query.page);
    sql.finish()
}

/// Render a post listing.
#[must_use]
pub fn select_posts(query: &PostListQuery) -> SqlQuery {
    let mut sql = SqlBuilder::new(format!("SELECT {POST_COLUMNS} FROM {POSTS_TABLE}"));

    if let Some(user_id) = query.user_id {
        sql.push(" WHERE user_id = ");
        sql.bind(SqlParam::BigInt(user_id.get()));
    }

    sql.push(" ORDER BY id ASC");
    sql.page(query.page);
    sql.finish()
}

/// Column backing a sort key.
#[must_use]
pub fn order_column(order: UserOrder) -> &'static str {
    match order {
        UserOrder::Id => "id",
        UserOrder::CreatedAt => "created_at",
        UserOrder::Login => "login",
    }
}

// =============================================================================
// Builder
// =============================================================================

struct SqlBuilder {
    text: String,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    fn new(head: String) -> Self {
        Self {
            text: head,
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &'static str) {
        self.text.push_str(fragment);
    }

    fn bind(&mut self, param: SqlParam) {
        self.params.push(param);
        self.text.push('$');
        self.text.push_str(&self.params.len().to_string());
    }

    fn page(&mut self, page: Page) {
        if let Some(limit) = page.limit {
            self.push(" LIMIT ");
            self.bind(SqlParam::BigInt(clamp_i64(limit)));
        }
        if page.offset > 0 {
            self.push(" OFFSET ");
            self.bind(SqlParam::BigInt(clamp_i64(page.offset)));
        }
    }

    fn finish(self) -> SqlQuery {
        SqlQuery {
            text: self.text,
            params: self.params,
        }
    }
}

// Page::parse already rejects values above i64::MAX.
fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::query::{PostListParams, UserListParams};

    #[test]
    fn test_select_all_users() {
        let sql = select_users(&UserListQuery::all());
        assert_eq!(
            sql.text,
            "SELECT id, login, full_name, created_at FROM users ORDER BY id ASC"
        );
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_select_users_filtered_sorted_paged() {
        let query = UserListQuery::parse(&UserListParams {
            login: Some("alice".to_string()),
            order_by: Some("login".to_string()),
            limit: Some("2".to_string()),
            offset: Some("1".to_string()),
        })
        .unwrap();

        let sql = select_users(&query);
        assert_eq!(
            sql.text,
            "SELECT id, login, full_name, created_at FROM users \
             WHERE login = $1 ORDER BY login ASC, id ASC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            sql.params,
            vec![
                SqlParam::Text("alice".to_string()),
                SqlParam::BigInt(2),
                SqlParam::BigInt(1),
            ]
        );
    }

    #[test]
    fn test_user_values_never_reach_sql_text() {
        let hostile = "x' OR '1'='1";
        let query = UserListQuery::parse(&UserListParams {
            login: Some(hostile.to_string()),
            ..UserListParams::default()
        })
        .unwrap();

        let sql = select_users(&query);
        assert!(!sql.text.contains(hostile));
        assert_eq!(sql.params, vec![SqlParam::Text(hostile.to_string())]);
    }

    #[test]
    fn test_offset_only() {
        let query = UserListQuery {
            page: Page { limit: None, offset: 4 },
            ..UserListQuery::all()
        };
        let sql = select_users(&query);
        assert!(sql.text.ends_with("ORDER BY id ASC OFFSET $1"));
        assert_eq!(sql.params, vec![SqlParam::BigInt(4)]);
    }

    #[test]
    fn test_select_posts_by_user() {
        let query = PostListQuery::parse(&PostListParams {
            user_id: Some("7".to_string()),
            limit: Some("10".to_string()),
            offset: Some("20".to_string()),
        })
        .unwrap();

        let sql = select_posts(&query);
        assert_eq!(
            sql.text,
            "SELECT id, user_id, text, created_at FROM posts \
             WHERE user_id = $1 ORDER BY id ASC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            sql.params,
            vec![SqlParam::BigInt(7), SqlParam::BigInt(10), SqlParam::BigInt(20)]
        );
    }

    #[test]
    fn test_select_posts_unfiltered() {
        let sql = select_posts(&PostListQuery::default());
        assert_eq!(
            sql.text,
            "SELECT id, user_id, text, created_at FROM posts ORDER BY id ASC"
        );

        let sql = select_posts(&PostListQuery::by_user(UserId(3)));
        assert_eq!(sql.params, vec![SqlParam::BigInt(3)]);
    }
}

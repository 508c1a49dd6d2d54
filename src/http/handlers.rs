//! Route handlers. Each one parses input, makes one repository call and
//! returns the result as JSON.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use board_core::{
    NewPost, NewUser, Post, PostListParams, PostListQuery, StorageError, User, UserId,
    UserListParams, UserListQuery,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: String,
    /// Active storage backend
    pub backend: String,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.repo.backend().to_string(),
    })
}

pub(super) async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<User> {
    let Json(user) = body?;
    let created = state.repo.create_user(&state.context(), user).await?;
    tracing::info!(user_id = created.id.get(), "user created");
    Ok(Json(created))
}

pub(super) async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<User> {
    let Path(raw_id) = path?;
    let id = parse_user_id(&raw_id)?;
    Ok(Json(state.repo.get_user_by_id(&state.context(), id).await?))
}

pub(super) async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<UserListParams>, QueryRejection>,
) -> ApiResult<Vec<User>> {
    let Query(params) = params?;
    let query = UserListQuery::parse(&params)?;
    Ok(Json(state.repo.list_users(&state.context(), &query).await?))
}

pub(super) async fn list_all_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(Json(state.repo.list_all_users(&state.context()).await?))
}

pub(super) async fn create_post(
    State(state): State<AppState>,
    body: Result<Json<NewPost>, JsonRejection>,
) -> ApiResult<Post> {
    let Json(post) = body?;
    let created = state.repo.create_post(&state.context(), post).await?;
    tracing::info!(
        user_id = created.user_id.get(),
        post_id = created.id.get(),
        "post created"
    );
    Ok(Json(created))
}

pub(super) async fn list_posts(
    State(state): State<AppState>,
    params: Result<Query<PostListParams>, QueryRejection>,
) -> ApiResult<Vec<Post>> {
    let Query(params) = params?;
    let query = PostListQuery::parse(&params)?;
    Ok(Json(
        state
            .repo
            .list_posts_by_user(&state.context(), &query)
            .await?,
    ))
}

fn parse_user_id(raw: &str) -> Result<UserId, StorageError> {
    raw.parse::<i64>()
        .map(UserId)
        .map_err(|e| StorageError::invalid("id", format!("{raw:?} is not an integer id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("42").unwrap(), UserId(42));
        assert!(matches!(
            parse_user_id("abc"),
            Err(StorageError::InvalidParameter { name: "id", .. })
        ));
    }
}

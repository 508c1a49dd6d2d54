//! End-to-end tests of the HTTP API over the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use board_core::{Repository, SimFaults, SimRepository};
use http_body_util::BodyExt;
use postboard::http::{router, AppState, ErrorBody, HealthResponse};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const OP_TIMEOUT: Duration = Duration::from_secs(1);

fn app_with(repo: Arc<dyn Repository>) -> Router {
    router(AppState::new(repo, OP_TIMEOUT, CancellationToken::new()))
}

fn app() -> Router {
    app_with(Arc::new(SimRepository::new()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

fn error_code(body: &Value) -> String {
    let envelope: ErrorBody = serde_json::from_value(body.clone()).unwrap();
    envelope.code
}

#[tokio::test]
async fn test_users_and_posts_scenario() {
    let app = app();

    let (status, user) = post(&app, "/users", json!({"login": "yan", "fullName": "Yan Doe"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], 1);
    assert_eq!(user["login"], "yan");
    assert_eq!(user["fullName"], "Yan Doe");
    assert!(user["createdAt"].is_string());

    let (status, fetched) = get(&app, "/users/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, user);

    let (status, listed) = get(&app, "/users?login=yan").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([user]));

    let (status, created) = post(&app, "/posts", json!({"userId": 1, "text": "hello"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["userId"], 1);
    assert_eq!(created["text"], "hello");
    assert!(created["id"].as_i64().unwrap() > 0);
    assert!(created["createdAt"].is_string());

    let (status, posts) = get(&app, "/posts?userId=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(posts, json!([created]));

    let (status, body) = post(&app, "/posts", json!({"userId": 999, "text": "x"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "reference_not_found");

    let (_, posts) = get(&app, "/posts").await;
    assert_eq!(posts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_users_pagination_and_order() {
    let app = app();
    for login in ["dave", "alice", "carol", "bob"] {
        let (status, _) = post(&app, "/users", json!({"login": login, "fullName": login})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, page) = get(&app, "/users?limit=2&offset=1").await;
    let ids: Vec<i64> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3]);

    let (_, sorted) = get(&app, "/users?orderBy=login").await;
    let logins: Vec<&str> = sorted
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["login"].as_str().unwrap())
        .collect();
    assert_eq!(logins, vec!["alice", "bob", "carol", "dave"]);

    let (status, all) = get(&app, "/users/all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 4);

    let (status, empty) = get(&app, "/users?limit=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty, json!([]));
}

#[tokio::test]
async fn test_bad_parameters_are_400() {
    let app = app();

    for uri in [
        "/users?limit=abc",
        "/users?offset=-1",
        "/users?orderBy=password",
        "/posts?userId=abc",
        "/users/abc",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error_code(&body), "invalid_parameter", "{uri}");
    }

    let (status, body) = post(&app, "/users", json!({"login": "", "fullName": "Nobody"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_parameter");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let app = app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/posts", json!({"text": "no author"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "bad_request");
}

#[tokio::test]
async fn test_malformed_query_string_is_400_envelope() {
    let app = app();

    for uri in ["/users?limit=1&limit=2", "/posts?userId=1&userId=2"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error_code(&body), "bad_request", "{uri}");
    }
}

#[tokio::test]
async fn test_missing_user_and_duplicate_login() {
    let app = app();

    let (status, body) = get(&app, "/users/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let envelope: ErrorBody = serde_json::from_value(body).unwrap();
    assert_eq!(envelope.code, "not_found");
    assert_eq!(envelope.message, "user 7 not found");

    post(&app, "/users", json!({"login": "yan", "fullName": "Yan Doe"})).await;
    let (status, body) = post(&app, "/users", json!({"login": "yan", "fullName": "Yan Two"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "login_taken");
}

#[tokio::test]
async fn test_concurrent_posts_for_one_user() {
    let app = app();
    post(&app, "/users", json!({"login": "yan", "fullName": "Yan Doe"})).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            post(&app, "/posts", json!({"userId": 1, "text": format!("post {i}")})).await
        }));
    }
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let (_, posts) = get(&app, "/posts?userId=1").await;
    assert_eq!(posts.as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_storage_faults_map_to_5xx() {
    let down = app_with(Arc::new(SimRepository::with_faults(SimFaults::unavailable())));
    let (status, body) = get(&down, "/users/all").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "storage_unavailable");

    let slow = router(AppState::new(
        Arc::new(SimRepository::with_faults(SimFaults::with_latency(
            Duration::from_millis(200),
        ))),
        Duration::from_millis(20),
        CancellationToken::new(),
    ));
    let (status, body) = get(&slow, "/users/all").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_code(&body), "deadline_exceeded");
}

#[tokio::test]
async fn test_shutdown_token_cancels_requests() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let app = router(AppState::new(
        Arc::new(SimRepository::new()),
        OP_TIMEOUT,
        shutdown,
    ));

    let (status, body) = get(&app, "/users/all").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "cancelled");
}

#[tokio::test]
async fn test_health_reports_backend() {
    let (status, body) = get(&app(), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.backend, "memory");
}

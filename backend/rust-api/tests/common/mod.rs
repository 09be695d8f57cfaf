#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use lessonpath_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    repo::Repositories,
    services::{catalog_seed::CatalogSeed, AppState},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret";

const CATALOG: &str = include_str!("../../config/catalog.seed.json");

/// Router over in-memory storage seeded with the demo catalog.
pub async fn create_test_app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let repos = Repositories::in_memory();
    CatalogSeed::from_json(CATALOG)
        .expect("Failed to parse catalog seed")
        .apply(&repos)
        .await
        .expect("Failed to seed catalog");

    let state = AppState::with_repositories(Config::in_memory(JWT_SECRET), repos);
    create_router(Arc::new(state))
}

pub fn token_for(user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    JwtService::new(JWT_SECRET)
        .generate_token(JwtClaims {
            sub: user_id.to_string(),
            role: Some("student".to_string()),
            exp: (now + 3600) as usize,
            iat: now as usize,
        })
        .expect("Failed to sign test token")
}

/// Sends a request as `user_id` (or anonymously) and decodes the JSON body.
/// Empty bodies decode to `Value::Null`.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user_id: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user_id)));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str, user_id: i64) -> (StatusCode, Value) {
    send(app, "GET", uri, Some(user_id), None).await
}

pub async fn post(app: &Router, uri: &str, user_id: i64, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(user_id), Some(body)).await
}

pub async fn start_attempt(app: &Router, user_id: i64, level_id: i64) -> i64 {
    let (status, body) = post(
        app,
        "/api/v1/attempts",
        user_id,
        serde_json::json!({ "level_id": level_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start failed: {}", body);
    body["id"].as_i64().expect("attempt id")
}

pub async fn answer(
    app: &Router,
    user_id: i64,
    attempt_id: i64,
    question_id: i64,
    choice_ids: &[i64],
) -> (StatusCode, Value) {
    post(
        app,
        &format!("/api/v1/attempts/{}/answer", attempt_id),
        user_id,
        serde_json::json!({ "question_id": question_id, "choice_ids": choice_ids }),
    )
    .await
}

/// Answers every question of level 1 correctly and completes the attempt.
pub async fn pass_basics(app: &Router, user_id: i64) -> Value {
    let attempt_id = start_attempt(app, user_id, 1).await;
    answer(app, user_id, attempt_id, 1, &[1]).await;
    answer(app, user_id, attempt_id, 2, &[4, 5]).await;
    let (status, result) = post(
        app,
        &format!("/api/v1/attempts/{}/complete", attempt_id),
        user_id,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "complete failed: {}", result);
    result
}

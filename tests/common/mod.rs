#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use socialshelf::{build_router, config::Config, store::MemoryStore, AppState};
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";
pub const ADMIN: &str = "root";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// A router over a fresh in-memory store; registering `root` yields an admin.
pub fn app() -> TestApp {
    let config = Config {
        admin_usernames: vec![ADMIN.to_string()],
        ..Config::default()
    };
    let state = AppState::new(Arc::new(MemoryStore::new()), config);
    TestApp {
        router: build_router(state.clone()),
        state,
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn api_call(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(&app.router, request(method, uri, token, body)).await
}

/// Registers `username` and returns its token and id.
pub async fn register(app: &TestApp, username: &str) -> (String, i64) {
    let (status, body) = api_call(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": PASSWORD,
            "password2": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

/// Registers `username` and has the admin grant it `role`.
pub async fn register_with_role(app: &TestApp, admin_token: &str, username: &str, role: &str) -> (String, i64) {
    let (token, id) = register(app, username).await;
    let (status, body) = api_call(
        app,
        "PUT",
        &format!("/api/users/{id}/role"),
        Some(admin_token),
        Some(json!({ "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (token, id)
}

pub async fn create_post(app: &TestApp, token: &str, title: &str) -> i64 {
    let (status, body) = api_call(
        app,
        "POST",
        "/api/posts",
        Some(token),
        Some(json!({ "title": title, "content": format!("About {title}") })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

pub async fn unread_count(app: &TestApp, token: &str) -> i64 {
    let (status, body) = api_call(app, "GET", "/api/notifications/unread_count", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["count"].as_i64().unwrap()
}

mod common;

use axum::http::{header, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::*;

#[tokio::test]
async fn register_returns_token_and_private_profile() {
    let app = app();
    let (status, body) = api_call(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": "alice",
            "email": "Alice@Example.com",
            "password": PASSWORD,
            "password2": PASSWORD,
            "bio": "reader",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "member");
    assert_eq!(body["user"]["followers_count"], 0);
}

#[tokio::test]
async fn register_reports_every_invalid_field() {
    let app = app();
    let (status, body) = api_call(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": "1x",
            "email": "nope",
            "password": "short",
            "password2": "other",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["username", "email", "password", "password2"] {
        assert!(body[field].is_array(), "missing error for {field}: {body}");
    }
}

#[tokio::test]
async fn usernames_and_emails_are_unique() {
    let app = app();
    register(&app, "alice").await;

    let (status, body) = api_call(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": PASSWORD,
            "password2": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["username"][0], "A user with that username already exists.");
    assert_eq!(body["email"][0], "A user with that email already exists.");
}

#[tokio::test]
async fn configured_usernames_register_as_admins() {
    let app = app();
    let (token, _) = register(&app, ADMIN).await;
    let (_, body) = api_call(&app, "GET", "/api/users/profile", Some(&token), None).await;
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn login_sets_a_session_cookie_that_authenticates() {
    let app = app();
    register(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap().to_string();
    let mut profile = request("GET", "/api/users/profile", None, None);
    profile
        .headers_mut()
        .insert(header::COOKIE, session.parse().unwrap());
    let (status, body) = send(&app.router, profile).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let app = app();
    register(&app, "alice").await;

    for (username, password) in [("alice", "wrong-password"), ("nobody", PASSWORD)] {
        let (status, body) = api_call(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Unable to log in with provided credentials.");
    }
}

#[tokio::test]
async fn logout_revokes_every_token() {
    let app = app();
    let (token, _) = register(&app, "alice").await;

    let (status, _) = api_call(&app, "POST", "/api/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = api_call(&app, "GET", "/api/users/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid token.");
}

#[tokio::test]
async fn anonymous_and_garbage_credentials() {
    let app = app();

    let (status, body) = api_call(&app, "GET", "/api/users/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Authentication credentials were not provided.");

    let (status, _) = api_call(&app, "GET", "/api/users/profile", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A bad cookie only makes the caller anonymous.
    let mut listing = request("GET", "/api/posts", None, None);
    listing
        .headers_mut()
        .insert(header::COOKIE, "session=garbage".parse().unwrap());
    let (status, _) = send(&app.router, listing).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn profiles_hide_email_from_others() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (_, own) = api_call(&app, "GET", &format!("/api/users/{alice_id}"), Some(&alice), None).await;
    assert_eq!(own["email"], "alice@example.com");

    let (status, other) = api_call(&app, "GET", &format!("/api/users/{alice_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(other.get("email").is_none());

    let (status, _) = api_call(&app, "GET", "/api/users/999", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = api_call(&app, "GET", "/api/users/abc", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_owner_updates_a_profile() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let uri = format!("/api/users/{alice_id}");
    let (status, _) = api_call(&app, "PATCH", &uri, Some(&bob), Some(json!({ "bio": "hacked" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api_call(&app, "PATCH", &uri, Some(&alice), Some(json!({ "bio": "Reads a lot" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bio"], "Reads a lot");
    assert_eq!(body["email"], "alice@example.com");

    let (status, body) = api_call(
        &app,
        "PATCH",
        &uri,
        Some(&alice),
        Some(json!({ "email": "bob@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());
}

#[tokio::test]
async fn users_are_listed_searched_and_ordered() {
    let app = app();
    let (token, _) = register(&app, "carol").await;
    register(&app, "alice").await;
    register(&app, "bob").await;

    let (status, body) = api_call(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["results"][0]["username"], "alice");

    let (_, body) = api_call(&app, "GET", "/api/users?ordering=-username", Some(&token), None).await;
    assert_eq!(body["results"][0]["username"], "carol");

    let (_, body) = api_call(&app, "GET", "/api/users?search=BO", Some(&token), None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["username"], "bob");

    let (status, _) = api_call(&app, "GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_changes_are_admin_only() {
    let app = app();
    let (admin, _) = register(&app, ADMIN).await;
    let (alice, alice_id) = register(&app, "alice").await;
    let uri = format!("/api/users/{alice_id}/role");

    let (status, _) = api_call(&app, "PUT", &uri, None, Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = api_call(&app, "PUT", &uri, Some(&alice), Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api_call(&app, "PUT", &uri, Some(&admin), Some(json!({ "role": "wizard" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["role"][0], "\"wizard\" is not a valid choice.");

    let (status, body) = api_call(&app, "PUT", &uri, Some(&admin), Some(json!({ "role": "librarian" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "librarian");
}

#[tokio::test]
async fn accounts_are_deleted_by_owner_or_admin() {
    let app = app();
    let (admin, _) = register(&app, ADMIN).await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (status, _) = api_call(&app, "DELETE", &format!("/api/users/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = api_call(&app, "DELETE", &format!("/api/users/{alice_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = api_call(&app, "DELETE", &format!("/api/users/{bob_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = api_call(&app, "GET", "/api/users/profile", Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

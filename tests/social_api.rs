mod common;

use std::time::Duration;

use axum::http::StatusCode;
use hyper::body::HttpBody;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

#[tokio::test]
async fn posts_are_public_to_read_and_private_to_edit() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (status, _) = api_call(&app, "POST", "/api/posts", None, Some(json!({ "title": "t", "content": "c" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let post_id = create_post(&app, &alice, "Dune").await;
    let uri = format!("/api/posts/{post_id}");

    let (status, body) = api_call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author"]["id"], alice_id);
    assert_eq!(body["comment_count"], 0);
    assert_eq!(body["likes_count"], 0);
    assert_eq!(body["is_liked"], false);

    let (status, _) = api_call(&app, "PATCH", &uri, Some(&bob), Some(json!({ "title": "Mine" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = api_call(&app, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api_call(&app, "PATCH", &uri, Some(&alice), Some(json!({ "title": "Dune Messiah" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Dune Messiah");
    assert_eq!(body["content"], "About Dune");

    // PUT needs every field.
    let (status, body) = api_call(&app, "PUT", &uri, Some(&alice), Some(json!({ "title": "Only title" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["content"][0], "This field is required.");

    let (status, _) = api_call(&app, "DELETE", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = api_call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_validation() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;

    let (status, body) = api_call(&app, "POST", "/api/posts", Some(&alice), Some(json!({ "title": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["title"][0], "This field may not be blank.");
    assert_eq!(body["content"][0], "This field is required.");

    let (status, body) = api_call(
        &app,
        "POST",
        "/api/posts",
        Some(&alice),
        Some(json!({ "title": "x".repeat(201), "content": "c" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["title"].is_array());
}

#[tokio::test]
async fn posts_are_filtered_searched_and_paginated() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    for title in ["Rust in Action", "Zero to Production", "Rustonomicon"] {
        create_post(&app, &alice, title).await;
    }
    create_post(&app, &bob, "Gardening").await;

    let (_, body) = api_call(&app, "GET", "/api/posts", None, None).await;
    assert_eq!(body["count"], 4);
    assert_eq!(body["results"][0]["title"], "Gardening");
    assert_eq!(body["next"], Value::Null);

    let (_, body) = api_call(&app, "GET", &format!("/api/posts?author={alice_id}"), None, None).await;
    assert_eq!(body["count"], 3);

    let (_, body) = api_call(&app, "GET", "/api/posts?search=rust", None, None).await;
    assert_eq!(body["count"], 2);

    let (_, body) = api_call(&app, "GET", "/api/posts?search=rust,action", None, None).await;
    assert_eq!(body["count"], 1);

    let (_, body) = api_call(&app, "GET", "/api/posts?page_size=3&ordering=created_at", None, None).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(body["results"][0]["title"], "Rust in Action");
    assert_eq!(body["next"], 2);
    assert_eq!(body["previous"], Value::Null);

    let (_, body) = api_call(&app, "GET", "/api/posts?page_size=3&page=2", None, None).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["previous"], 1);

    for page in ["3", "0", "abc"] {
        let (status, body) = api_call(&app, "GET", &format!("/api/posts?page_size=3&page={page}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Invalid page.");
    }

    let (status, body) = api_call(&app, "GET", "/api/posts?author=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["author"][0], "Enter a number.");
}

#[tokio::test]
async fn page_size_is_capped() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    for i in 0..105 {
        create_post(&app, &alice, &format!("Post {i}")).await;
    }
    let (_, body) = api_call(&app, "GET", "/api/posts?page_size=1000", None, None).await;
    assert_eq!(body["count"], 105);
    assert_eq!(body["results"].as_array().unwrap().len(), 100);
    assert_eq!(body["next"], 2);
}

#[tokio::test]
async fn comments_notify_the_post_author_except_on_self_comments() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;
    let post_id = create_post(&app, &alice, "Dune").await;

    let (status, _) = api_call(
        &app,
        "POST",
        &format!("/api/posts/{post_id}/comment"),
        Some(&alice),
        Some(json!({ "content": "First!" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(unread_count(&app, &alice).await, 0);

    let (status, comment) = api_call(
        &app,
        "POST",
        "/api/comments",
        Some(&bob),
        Some(json!({ "post": post_id, "content": "Great read" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["post"], post_id);
    assert_eq!(comment["author"]["id"], bob_id);
    assert_eq!(unread_count(&app, &alice).await, 1);

    let (_, body) = api_call(&app, "GET", "/api/notifications", Some(&alice), None).await;
    let notification = &body["results"][0];
    assert_eq!(notification["verb"], "comment");
    assert_eq!(notification["target_type"], "comment");
    assert_eq!(notification["target_id"], comment["id"]);
    assert_eq!(notification["actor"]["id"], bob_id);
    assert_eq!(notification["recipient"]["id"], alice_id);
    assert_eq!(notification["read"], false);

    let (_, post) = api_call(&app, "GET", &format!("/api/posts/{post_id}"), None, None).await;
    assert_eq!(post["comment_count"], 2);
}

#[tokio::test]
async fn comment_rules() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let first = create_post(&app, &alice, "Dune").await;
    let second = create_post(&app, &alice, "Emma").await;

    let (status, body) = api_call(&app, "POST", "/api/comments", Some(&bob), Some(json!({ "post": 999, "content": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["post"][0], "Invalid pk \"999\" - object does not exist.");

    let (status, _) = api_call(&app, "POST", "/api/posts/999/comment", Some(&bob), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, comment) = api_call(&app, "POST", "/api/comments", Some(&bob), Some(json!({ "post": first, "content": "hi" }))).await;
    let uri = format!("/api/comments/{}", comment["id"]);

    let (status, _) = api_call(&app, "PATCH", &uri, Some(&alice), Some(json!({ "content": "edited" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api_call(&app, "PATCH", &uri, Some(&bob), Some(json!({ "post": second }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["post"][0], "The post of a comment cannot be changed.");

    let (status, body) = api_call(&app, "PUT", &uri, Some(&bob), Some(json!({ "post": first, "content": "edited" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "edited");

    let (_, listed) = api_call(&app, "GET", &format!("/api/comments?post={first}&search=EDIT"), None, None).await;
    assert_eq!(listed["count"], 1);

    let (status, _) = api_call(&app, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    // The comment notification went with it.
    assert_eq!(unread_count(&app, &alice).await, 0);
}

#[tokio::test]
async fn likes_are_unique_and_unlike_retracts_the_notification() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;
    let post_id = create_post(&app, &alice, "Dune").await;
    let like_uri = format!("/api/posts/{post_id}/like");
    let unlike_uri = format!("/api/posts/{post_id}/unlike");

    let (status, like) = api_call(&app, "POST", &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(like["user"]["id"], bob_id);
    assert_eq!(like["post"], post_id);
    assert_eq!(unread_count(&app, &alice).await, 1);

    let (status, body) = api_call(&app, "POST", &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You have already liked this post.");

    let (_, post) = api_call(&app, "GET", &format!("/api/posts/{post_id}"), Some(&bob), None).await;
    assert_eq!(post["likes_count"], 1);
    assert_eq!(post["is_liked"], true);

    let (_, likes) = api_call(&app, "GET", &format!("/api/posts/{post_id}/likes"), None, None).await;
    assert_eq!(likes["count"], 1);

    let (status, body) = api_call(&app, "POST", &unlike_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "Post unliked.");
    assert_eq!(unread_count(&app, &alice).await, 0);

    let (status, body) = api_call(&app, "POST", &unlike_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You have not liked this post.");

    // Liking your own post is allowed but nobody is notified.
    let (status, _) = api_call(&app, "POST", &like_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(unread_count(&app, &alice).await, 0);

    let (status, _) = api_call(&app, "POST", "/api/posts/999/like", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = api_call(&app, "POST", &like_uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_likes_create_a_single_row() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let post_id = create_post(&app, &alice, "Dune").await;

    let calls = (0..8).map(|_| {
        let router = app.router.clone();
        let request = request("POST", &format!("/api/posts/{post_id}/like"), Some(&bob), None);
        tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
    });
    let mut created = 0;
    for call in calls.collect::<Vec<_>>() {
        match call.await.unwrap() {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::BAD_REQUEST),
        }
    }
    assert_eq!(created, 1);

    let (_, post) = api_call(&app, "GET", &format!("/api/posts/{post_id}"), None, None).await;
    assert_eq!(post["likes_count"], 1);
    assert_eq!(unread_count(&app, &alice).await, 1);
}

#[tokio::test]
async fn follows_feed_and_unfollow() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;
    let (carol, _) = register(&app, "carol").await;
    create_post(&app, &bob, "Bob's post").await;
    create_post(&app, &carol, "Carol's post").await;

    let (status, body) = api_call(&app, "POST", &format!("/api/follow/{alice_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You cannot follow yourself.");

    let (status, body) = api_call(&app, "POST", &format!("/api/follow/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "You are now following bob.");
    assert_eq!(unread_count(&app, &bob).await, 1);

    let (status, body) = api_call(&app, "POST", &format!("/api/follow/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You are already following this user.");

    let (status, _) = api_call(&app, "POST", "/api/follow/999", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, profile) = api_call(&app, "GET", &format!("/api/users/{bob_id}"), Some(&alice), None).await;
    assert_eq!(profile["followers_count"], 1);

    let (status, feed) = api_call(&app, "GET", "/api/feed", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["results"][0]["title"], "Bob's post");

    let (status, body) = api_call(&app, "POST", &format!("/api/unfollow/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "You have unfollowed bob.");
    assert_eq!(unread_count(&app, &bob).await, 0);

    let (status, body) = api_call(&app, "POST", &format!("/api/unfollow/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You are not following this user.");

    let (_, feed) = api_call(&app, "GET", "/api/feed", Some(&alice), None).await;
    assert_eq!(feed["count"], 0);
}

#[tokio::test]
async fn notifications_belong_to_their_recipient() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let first = create_post(&app, &alice, "Dune").await;
    let second = create_post(&app, &alice, "Emma").await;
    for post_id in [first, second] {
        api_call(&app, "POST", &format!("/api/posts/{post_id}/like"), Some(&bob), None).await;
    }

    let (_, body) = api_call(&app, "GET", "/api/notifications", Some(&alice), None).await;
    assert_eq!(body["count"], 2);
    let id = body["results"][0]["id"].as_i64().unwrap();
    let uri = format!("/api/notifications/{id}");

    let (status, _) = api_call(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = api_call(&app, "POST", &format!("{uri}/mark_read"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api_call(&app, "POST", &format!("{uri}/mark_read"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = api_call(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(body["read"], true);

    let (_, unread) = api_call(&app, "GET", "/api/notifications?read=false", Some(&alice), None).await;
    assert_eq!(unread["count"], 1);
    let (status, body) = api_call(&app, "GET", "/api/notifications?read=maybe", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["read"][0], "Enter a valid boolean.");

    let (status, _) = api_call(&app, "POST", "/api/notifications/mark_all_read", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = api_call(&app, "POST", "/api/notifications/unread_count", Some(&alice), None).await;
    assert_eq!(body["count"], 0);

    let (status, _) = api_call(&app, "GET", "/api/notifications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_a_post_removes_its_engagement() {
    let app = app();
    let (alice, _) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let post_id = create_post(&app, &alice, "Dune").await;
    api_call(&app, "POST", &format!("/api/posts/{post_id}/like"), Some(&bob), None).await;
    api_call(&app, "POST", &format!("/api/posts/{post_id}/comment"), Some(&bob), Some(json!({ "content": "hi" }))).await;
    assert_eq!(unread_count(&app, &alice).await, 2);

    api_call(&app, "DELETE", &format!("/api/posts/{post_id}"), Some(&alice), None).await;
    assert_eq!(unread_count(&app, &alice).await, 0);
    let (_, comments) = api_call(&app, "GET", &format!("/api/comments?post={post_id}"), None, None).await;
    assert_eq!(comments["count"], 0);
}

/// A field line is `name:value`, with one optional space before the value.
fn sse_field<'a>(event: &'a str, name: &str) -> Option<&'a str> {
    event
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
}

#[tokio::test]
async fn notification_stream_receives_new_notifications() {
    let app = app();
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let post_id = create_post(&app, &alice, "Dune").await;

    let (status, _) = api_call(&app, "GET", "/api/notifications/stream", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/notifications/stream", Some(&alice), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(app.state.event_tracker.connection_count(alice_id).await, 1);

    api_call(&app, "POST", &format!("/api/posts/{post_id}/like"), Some(&bob), None).await;

    let mut body = response.into_body();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.data())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let event = String::from_utf8(chunk.to_vec()).unwrap();
    assert_eq!(sse_field(&event, "event"), Some("notification"), "{event}");
    let data = sse_field(&event, "data").unwrap();
    let notification: Value = serde_json::from_str(data).unwrap();
    assert_eq!(notification["verb"], "like");
    assert_eq!(notification["recipient"]["id"], alice_id);
}

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use quill::api::AppState;
use quill::config::Config;
use std::sync::Arc;
use tower::ServiceExt;

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // Keep test runs fast; production defaults are higher.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;

    let state = quill::api::create_app_state_from_config(config)
        .await
        .expect("Failed to create app state");
    let app = quill::api::router(state.clone()).await;
    (app, state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let body = match body {
        Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn signup_body(name: &str, username: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "username": username,
        "email": email,
        "password": "hunter2hunter2",
    })
}

/// Signs up a fresh account and returns its bearer token and user id.
async fn signup(app: &Router, username: &str, email: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/signup",
        None,
        Some(signup_body("Test User", username, email)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");

    let token = body["data"]["token"].as_str().unwrap().to_string();
    let id = body["data"]["user"]["id"].as_i64().unwrap();
    (token, id)
}

#[tokio::test]
async fn protected_routes_require_auth() {
    let (app, _) = spawn_app().await;

    let (status, body) = send(&app, "GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        "POST",
        "/api/posts",
        None,
        Some(serde_json::json!({"title": "t", "content": "c", "category": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/users", Some("garbage-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_returns_token_and_rejects_duplicates() {
    let (app, _) = spawn_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(signup_body("Ada", "ada", "ada@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].as_str().is_some());
    assert_eq!(body["data"]["user"]["username"], "ada");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert_eq!(body["data"]["user"]["verified"], false);
    // The password never appears in any response shape.
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(signup_body("Ada Again", "ada2", "ada@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(signup_body("Ada Again", "ada", "other@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn signup_validates_input() {
    let (app, _) = spawn_app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "X",
            "username": "xx", // too short
            "email": "x@example.com",
            "password": "hunter2hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "X",
            "username": "xavier",
            "email": "not-an-email",
            "password": "hunter2hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "X",
            "username": "xavier",
            "email": "x@example.com",
            "password": "short",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "X",
            "username": "xavier",
            "email": "x@example.com",
            "password": "hunter2hunter2",
            "role": "superuser",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_uses_uniform_error_message() {
    let (app, _) = spawn_app().await;
    signup(&app, "carol", "carol@example.com").await;

    let (status, wrong_pw) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "carol@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "nobody@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown email and bad password are indistinguishable.
    assert_eq!(wrong_pw["error"], unknown["error"]);

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "carol@example.com", "password": "hunter2hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].as_str().is_some());
}

#[tokio::test]
async fn post_crud_with_ownership() {
    let (app, _) = spawn_app().await;
    let (owner_token, owner_id) = signup(&app, "owner", "owner@example.com").await;
    let (other_token, _) = signup(&app, "other", "other@example.com").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/posts",
        Some(&owner_token),
        Some(serde_json::json!({
            "title": "First Post",
            "content": "Hello world",
            "category": "general",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["user_id"], owner_id);
    assert_eq!(body["data"]["author"], "Test User");
    assert_eq!(body["data"]["views"], 0);

    // Listing is public.
    let (status, body) = send(&app, "GET", "/api/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["total_results"], 1);

    // Each fetch records a view.
    let uri = format!("/api/posts/{post_id}");
    let (_, first) = send(&app, "GET", &uri, Some(&other_token), None).await;
    let (_, second) = send(&app, "GET", &uri, Some(&other_token), None).await;
    assert_eq!(first["data"]["views"], 1);
    assert_eq!(second["data"]["views"], 2);

    // Only the owner can edit.
    let update = serde_json::json!({
        "title": "Edited",
        "content": "Changed",
        "category": "general",
    });
    let (status, _) = send(&app, "PUT", &uri, Some(&other_token), Some(update.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "PUT", &uri, Some(&owner_token), Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Edited");

    // A regular user who is not the owner cannot delete either.
    let (status, _) = send(&app, "DELETE", &uri, Some(&other_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn moderator_can_delete_others_posts() {
    let (app, _) = spawn_app().await;
    let (owner_token, _) = signup(&app, "writer", "writer@example.com").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "Mod",
            "username": "moderator1",
            "email": "mod@example.com",
            "password": "hunter2hunter2",
            "role": "moderator",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let mod_token = body["data"]["token"].as_str().unwrap().to_string();

    let (_, body) = send(
        &app,
        "POST",
        "/api/posts",
        Some(&owner_token),
        Some(serde_json::json!({"title": "t", "content": "c", "category": "x"})),
    )
    .await;
    let post_id = body["data"]["id"].as_i64().unwrap();

    // Moderators may not edit other people's posts, only remove them.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/posts/{post_id}"),
        Some(&mod_token),
        Some(serde_json::json!({"title": "x", "content": "y", "category": "z"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/posts/{post_id}"),
        Some(&mod_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn comment_crud_maintains_post_counter() {
    let (app, _) = spawn_app().await;
    let (author_token, _) = signup(&app, "author", "author@example.com").await;
    let (reader_token, reader_id) = signup(&app, "reader", "reader@example.com").await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/posts",
        Some(&author_token),
        Some(serde_json::json!({"title": "Post", "content": "Body", "category": "misc"})),
    )
    .await;
    let post_id = body["data"]["id"].as_i64().unwrap();

    let comments_uri = format!("/api/posts/{post_id}/comments");
    let (status, body) = send(
        &app,
        "POST",
        &comments_uri,
        Some(&reader_token),
        Some(serde_json::json!({"content": "Nice post"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["user_id"], reader_id);
    assert_eq!(body["data"]["is_edited"], false);

    // Reply to the comment.
    let (status, _) = send(
        &app,
        "POST",
        &comments_uri,
        Some(&author_token),
        Some(serde_json::json!({"content": "Thanks", "parent_comment_id": comment_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Replying to a nonexistent comment fails.
    let (status, _) = send(
        &app,
        "POST",
        &comments_uri,
        Some(&author_token),
        Some(serde_json::json!({"content": "?", "parent_comment_id": 9999})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/posts/{post_id}"),
        Some(&author_token),
        None,
    )
    .await;
    assert_eq!(body["data"]["comment_count"], 2);

    let comment_uri = format!("/api/posts/{post_id}/comments/{comment_id}");

    // Editing marks the comment and is owner-only.
    let (status, _) = send(
        &app,
        "PUT",
        &comment_uri,
        Some(&author_token),
        Some(serde_json::json!({"content": "hijacked"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "PUT",
        &comment_uri,
        Some(&reader_token),
        Some(serde_json::json!({"content": "Nice post indeed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_edited"], true);

    let (status, _) = send(&app, "DELETE", &comment_uri, Some(&reader_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/posts/{post_id}"),
        Some(&author_token),
        None,
    )
    .await;
    assert_eq!(body["data"]["comment_count"], 1);
}

#[tokio::test]
async fn post_listing_paginates() {
    let (app, _) = spawn_app().await;
    let (token, _) = signup(&app, "prolific", "prolific@example.com").await;

    for i in 0..7 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/posts",
            Some(&token),
            Some(serde_json::json!({
                "title": format!("Post {i}"),
                "content": "body",
                "category": "serial",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, "GET", "/api/posts?page=1&limit=3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["pagination"]["current_page"], 1);
    assert_eq!(body["data"]["pagination"]["total_pages"], 3);
    assert_eq!(body["data"]["pagination"]["total_results"], 7);
    assert_eq!(body["data"]["pagination"]["results_per_page"], 3);

    let (_, page3) = send(&app, "GET", "/api/posts?page=3&limit=3", None, None).await;
    assert_eq!(page3["data"]["items"].as_array().unwrap().len(), 1);

    // Beyond the last page is still a 200 with an empty item list.
    let (status, empty) = send(&app, "GET", "/api/posts?page=9&limit=3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["data"]["items"].as_array().unwrap().len(), 0);

    // The offset arithmetic must survive u64::MAX page numbers.
    let (status, body) = send(
        &app,
        "GET",
        "/api/posts?page=18446744073709551615&limit=100",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn profile_update_and_soft_delete() {
    let (app, _) = spawn_app().await;
    let (token, _) = signup(&app, "mutable", "mutable@example.com").await;
    signup(&app, "taken", "taken@example.com").await;

    // Unknown fields in the profile patch are rejected outright.
    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me",
        Some(&token),
        Some(serde_json::json!({"role": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me",
        Some(&token),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me",
        Some(&token),
        Some(serde_json::json!({"username": "taken"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "PATCH",
        "/api/users/me",
        Some(&token),
        Some(serde_json::json!({"name": "Renamed", "username": "renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["username"], "renamed");

    // Soft delete: the account vanishes and the token dies with it.
    let (status, _) = send(&app, "DELETE", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // And the login stops working too.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "mutable@example.com", "password": "hunter2hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_listing_is_protected_and_paginated() {
    let (app, _) = spawn_app().await;
    let (token, _) = signup(&app, "lister", "lister@example.com").await;
    signup(&app, "second", "second@example.com").await;

    let (status, body) = send(&app, "GET", "/api/users?limit=1", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["total_results"], 2);
}

#[tokio::test]
async fn system_status_reports_health() {
    let (app, _) = spawn_app().await;

    let (status, body) = send(&app, "GET", "/api/system/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database_ok"], true);
    assert!(body["data"]["version"].as_str().is_some());
}

#[tokio::test]
async fn serves_embedded_frontend() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    // Unknown paths fall back to the SPA entry point.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/some/client/route")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
}

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use quill::api::AppState;
use quill::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
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

async fn signup(app: &Router, username: &str, email: &str) -> (String, i32) {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": "Flow Tester",
            "username": username,
            "email": email,
            "password": "hunter2hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");

    let token = body["data"]["token"].as_str().unwrap().to_string();
    let id = body["data"]["user"]["id"].as_i64().unwrap() as i32;
    (token, id)
}

#[tokio::test]
async fn email_verification_flow() {
    let (app, state) = spawn_app().await;
    let (token, user_id) = signup(&app, "verifier", "verifier@example.com").await;

    // Requesting a code succeeds; mail is disabled in tests, so the code is
    // only logged. Plant a known code directly to drive the verify step.
    let (status, _) = send(&app, "POST", "/api/auth/verification-code", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let digest = state.codes().digest("123456");
    state
        .store()
        .set_verification_code(user_id, &digest)
        .await
        .unwrap();

    // Wrong code is rejected.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify-email",
        Some(&token),
        Some(serde_json::json!({"code": "000000"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed codes never reach the digest check.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify-email",
        Some(&token),
        Some(serde_json::json!({"code": "12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify-email",
        Some(&token),
        Some(serde_json::json!({"code": "123456"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user = state.store().get_user_by_id(user_id).await.unwrap().unwrap();
    assert!(user.verified);

    // The code is one-time use; a second attempt finds nothing pending.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify-email",
        Some(&token),
        Some(serde_json::json!({"code": "123456"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Requesting another code for a verified account is a conflict too.
    let (status, _) = send(&app, "POST", "/api/auth/verification-code", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn password_reset_flow_invalidates_tokens() {
    let (app, state) = spawn_app().await;
    let (token, _) = signup(&app, "resetter", "resetter@example.com").await;

    // Token timestamps have second resolution; make sure the reset lands in
    // a strictly later second than the token's issuance.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Unknown email gets a 404 rather than silently succeeding.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(serde_json::json!({"email": "nobody@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(serde_json::json!({"email": "resetter@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let digest = state.codes().digest("654321");
    state
        .store()
        .set_reset_code("resetter@example.com", &digest)
        .await
        .unwrap();

    // Wrong code leaves the password untouched.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(serde_json::json!({
            "email": "resetter@example.com",
            "code": "111111",
            "new_password": "brand-new-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(serde_json::json!({
            "email": "resetter@example.com",
            "code": "654321",
            "new_password": "brand-new-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The pre-reset token is no longer accepted.
    let (status, body) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "body: {body}");

    // Old password is gone, new one works.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "resetter@example.com", "password": "hunter2hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "resetter@example.com", "password": "brand-new-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The reset code was consumed.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/reset-password",
        None,
        Some(serde_json::json!({
            "email": "resetter@example.com",
            "code": "654321",
            "new_password": "yet-another-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_change_requires_verified_account() {
    let (app, state) = spawn_app().await;
    let (token, user_id) = signup(&app, "changer", "changer@example.com").await;

    let change = serde_json::json!({
        "old_password": "hunter2hunter2",
        "new_password": "a-different-password",
        "confirm_password": "a-different-password",
    });

    // Unverified accounts may not change their password.
    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me/password",
        Some(&token),
        Some(change.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    state.store().mark_user_verified(user_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Wrong old password.
    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me/password",
        Some(&token),
        Some(serde_json::json!({
            "old_password": "not-my-password",
            "new_password": "a-different-password",
            "confirm_password": "a-different-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Mismatched confirmation.
    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me/password",
        Some(&token),
        Some(serde_json::json!({
            "old_password": "hunter2hunter2",
            "new_password": "a-different-password",
            "confirm_password": "something-else-entirely",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Same as old.
    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me/password",
        Some(&token),
        Some(serde_json::json!({
            "old_password": "hunter2hunter2",
            "new_password": "hunter2hunter2",
            "confirm_password": "hunter2hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/users/me/password",
        Some(&token),
        Some(change),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The token used to change the password predates the change.
    let (status, _) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": "changer@example.com", "password": "a-different-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_cookie() {
    let (app, _) = spawn_app().await;
    let (token, _) = signup(&app, "leaver", "leaver@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()["set-cookie"].to_str().unwrap();
    assert!(cookie.starts_with("token=;"));
    assert!(cookie.contains("Max-Age=0"));

    // Bearer tokens are stateless; the token itself still verifies.
    let (status, _) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn auth_cookie_is_accepted_in_place_of_header() {
    let (app, _) = spawn_app().await;
    let (token, _) = signup(&app, "cookieuser", "cookie@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users")
                .header("Cookie", format!("token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Signup itself sets the cookie.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/signup")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "name": "Cookie Two",
                        "username": "cookietwo",
                        "email": "cookie2@example.com",
                        "password": "hunter2hunter2",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response.headers()["set-cookie"].to_str().unwrap();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
}

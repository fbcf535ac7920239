use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{
    validate_code, validate_email, validate_name, validate_password, validate_username,
};
use super::{ApiError, ApiResponse, AppState, MessageResponse, UserDto};
use crate::auth::{CodeError, TokenError};
use crate::db::{NewUser, Role, User};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// The caller resolved by the auth middleware, available to protected
/// handlers via request extensions.
#[derive(Clone)]
pub struct CurrentUser(pub User);

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the caller from a bearer token:
/// 1. verify signature and expiry
/// 2. load the user (soft-deleted accounts fail here)
/// 3. reject tokens issued before the last password change
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cookie_name = state.config().read().await.auth.cookie_name.clone();

    let token = extract_token(&headers, &cookie_name)
        .ok_or_else(|| ApiError::unauthorized("Please log in to access this resource"))?;

    let claims = state.tokens().verify(&token).map_err(|e| match e {
        TokenError::Expired => ApiError::unauthorized("Token has expired. Please log in again"),
        TokenError::Invalid => ApiError::unauthorized("Invalid authentication token"),
    })?;

    let user = state
        .store()
        .get_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    if user.password_changed_after(claims.iat) {
        return Err(ApiError::unauthorized(
            "Password was recently changed. Please log in again",
        ));
    }

    tracing::debug!("Authenticated request from user {}", user.id);
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Authorization header takes precedence over the auth cookie.
fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    if let Some(cookie_header) = headers.get(header::COOKIE)
        && let Ok(cookie_str) = cookie_header.to_str()
    {
        for pair in cookie_str.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=')
                && name == cookie_name
            {
                return Some(value.trim().to_string());
            }
        }
    }

    None
}

fn auth_cookie(name: &str, token: &str, max_age_seconds: i64) -> String {
    format!("{name}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_seconds}")
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/signup
/// Create an account and log straight in: 201 with token + cookie.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let name = validate_name(&payload.name)?;
    let username = validate_username(&payload.username)?;
    let email = validate_email(&payload.email)?;
    let password = validate_password(&payload.password)?;

    let role = match payload.role.as_deref() {
        None => Role::User,
        Some(raw) => {
            Role::parse(raw).ok_or_else(|| ApiError::validation(format!("Unknown role: {raw}")))?
        }
    };

    if state.store().email_in_use(email, None).await? {
        return Err(ApiError::conflict("Email already in use"));
    }
    if state.store().username_in_use(username, None).await? {
        return Err(ApiError::conflict("Username already in use"));
    }

    let security = state.config().read().await.security.clone();
    let user = state
        .store()
        .create_user(
            NewUser {
                name,
                username,
                email,
                role,
                password,
            },
            &security,
        )
        .await?;

    tracing::info!("New account created: {}", user.username);

    let (token, cookie) = issue_session(&state, &user).await?;
    let body = Json(ApiResponse::success(AuthResponse {
        token,
        user: UserDto::from(user),
    }));

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        body,
    )
        .into_response())
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    // Same message for unknown email and bad password.
    let user = state
        .store()
        .verify_user_password(payload.email.trim(), &payload.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let (token, cookie) = issue_session(&state, &user).await?;
    let body = Json(ApiResponse::success(AuthResponse {
        token,
        user: UserDto::from(user),
    }));

    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// POST /auth/logout
/// Tokens cannot be revoked server-side; this just clears the cookie.
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let cookie_name = state.config().read().await.auth.cookie_name.clone();
    let cookie = auth_cookie(&cookie_name, "", 0);

    let body = Json(ApiResponse::success(MessageResponse::new(
        "Logged out successfully",
    )));
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// POST /auth/verification-code
/// Generate and email a fresh verification code for the current user.
pub async fn send_verification_code(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if user.verified {
        return Err(ApiError::conflict("Account is already verified"));
    }

    let code = state.codes().generate();
    state
        .mailer()
        .send_verification_code(&user.email, &code)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to send verification email: {e}")))?;

    // Store only the keyed digest, never the code itself.
    let digest = state.codes().digest(&code);
    state.store().set_verification_code(user.id, &digest).await?;

    tracing::info!("Verification code sent to user {}", user.id);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Verification code sent",
    ))))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let code = validate_code(&payload.code)?;

    if user.verified {
        return Err(ApiError::conflict("Account is already verified"));
    }

    let pending = state.store().verification_state(user.id).await?;
    state
        .codes()
        .check(pending.digest.as_deref(), pending.sent_at.as_deref(), code)
        .map_err(code_error)?;

    state.store().mark_user_verified(user.id).await?;

    tracing::info!("User {} verified their email", user.id);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account verified",
    ))))
}

/// POST /auth/forgot-password
pub async fn send_forgot_password_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = validate_email(&payload.email)?;

    let user = state
        .store()
        .get_user_by_email(email)
        .await?
        .ok_or_else(|| ApiError::not_found("User", email))?;

    let code = state.codes().generate();
    state
        .mailer()
        .send_reset_code(&user.email, &code)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to send reset email: {e}")))?;

    let digest = state.codes().digest(&code);
    state.store().set_reset_code(&user.email, &digest).await?;

    tracing::info!("Password reset code sent to user {}", user.id);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password reset code sent",
    ))))
}

/// POST /auth/reset-password
/// Completing a reset bumps `password_changed_at`, so outstanding tokens
/// stop working.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = validate_email(&payload.email)?;
    let code = validate_code(&payload.code)?;
    let new_password = validate_password(&payload.new_password)?;

    let pending = state
        .store()
        .reset_state(email)
        .await?
        .ok_or_else(|| ApiError::not_found("User", email))?;

    state
        .codes()
        .check(pending.digest.as_deref(), pending.sent_at.as_deref(), code)
        .map_err(code_error)?;

    let security = state.config().read().await.security.clone();
    state
        .store()
        .reset_user_password(email, new_password, &security)
        .await?;

    tracing::info!("Password reset completed for {email}");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated. Please log in again",
    ))))
}

// ============================================================================
// Helpers
// ============================================================================

async fn issue_session(state: &Arc<AppState>, user: &User) -> Result<(String, String), ApiError> {
    let token = state
        .tokens()
        .issue(user.id, &user.email)
        .map_err(|e| ApiError::internal(format!("Failed to issue token: {e}")))?;

    let auth_config = state.config().read().await.auth.clone();
    let cookie = auth_cookie(
        &auth_config.cookie_name,
        &token,
        auth_config.token_ttl_hours * 3600,
    );

    Ok((token, cookie))
}

fn code_error(err: CodeError) -> ApiError {
    match err {
        CodeError::NotPending => ApiError::validation("Please request a new code"),
        CodeError::Expired => ApiError::validation("Code has expired. Please request a new one"),
        CodeError::Mismatch => ApiError::validation("Code does not match"),
    }
}

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::{
    PageQuery, validate_email, validate_name, validate_password, validate_username,
};
use super::{ApiError, ApiResponse, AppState, PageDto, PaginationMeta, UserDto};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PageDto<UserDto>>>, ApiError> {
    let pagination = state.config().read().await.pagination.clone();
    let (page, limit) = query.resolve(&pagination);

    let (users, total) = state.store().list_users(page, limit).await?;

    Ok(Json(ApiResponse::success(PageDto {
        items: users.into_iter().map(UserDto::from).collect(),
        pagination: PaginationMeta::new(page, limit, total),
    })))
}

/// PATCH /users/me
/// Only name, username, and email can change here; anything else in the
/// body is rejected by deserialization.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    if payload.name.is_none() && payload.username.is_none() && payload.email.is_none() {
        return Err(ApiError::validation("No fields to update"));
    }

    let name = payload.name.as_deref().map(validate_name).transpose()?;
    let username = payload
        .username
        .as_deref()
        .map(validate_username)
        .transpose()?;
    let email = payload.email.as_deref().map(validate_email).transpose()?;

    if let Some(email) = email
        && state.store().email_in_use(email, Some(user.id)).await?
    {
        return Err(ApiError::conflict("Email already in use"));
    }

    if let Some(username) = username
        && state
            .store()
            .username_in_use(username, Some(user.id))
            .await?
    {
        return Err(ApiError::conflict("Username already in use"));
    }

    let updated = state
        .store()
        .update_user_profile(user.id, name, username, email)
        .await?
        .ok_or_else(|| ApiError::not_found("User", user.id))?;

    Ok(Json(ApiResponse::success(UserDto::from(updated))))
}

/// PATCH /users/me/password
/// Bumps `password_changed_at`, invalidating outstanding tokens, and clears
/// the auth cookie so the browser has to log in again.
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Response, ApiError> {
    if !user.verified {
        return Err(ApiError::validation(
            "Please verify your account before changing the password",
        ));
    }

    let new_password = validate_password(&payload.new_password)?;

    if payload.old_password == payload.new_password {
        return Err(ApiError::validation(
            "New password must be different from old password",
        ));
    }
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation("Passwords do not match"));
    }

    let old_ok = state
        .store()
        .verify_user_password_by_id(user.id, &payload.old_password)
        .await?;
    if !old_ok {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let config = state.config().read().await.clone();
    state
        .store()
        .update_user_password(user.id, new_password, &config.security)
        .await?;

    tracing::info!("Password changed for user {}", user.id);

    let cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        config.auth.cookie_name
    );
    let body = Json(ApiResponse::success(super::MessageResponse::new(
        "Password updated. Please log in again",
    )));
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// DELETE /users/me
/// Soft delete; the account disappears from all lookups but rows remain.
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let deleted = state.store().deactivate_user(user.id).await?;
    if !deleted {
        return Err(ApiError::not_found("User", user.id));
    }

    tracing::info!("User {} deactivated their account", user.id);

    Ok(StatusCode::NO_CONTENT.into_response())
}

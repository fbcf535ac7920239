use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::access::{require_owner, require_owner_or_role};
use super::auth::CurrentUser;
use super::validation::{PageQuery, validate_non_empty};
use super::{ApiError, ApiResponse, AppState, CommentDto, PageDto, PaginationMeta};
use crate::db::Role;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_comment_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// GET /posts/{post_id}/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i32>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PageDto<CommentDto>>>, ApiError> {
    if state.store().get_post(post_id).await?.is_none() {
        return Err(ApiError::not_found("Post", post_id));
    }

    let pagination = state.config().read().await.pagination.clone();
    let (page, limit) = query.resolve(&pagination);

    let (comments, total) = state.store().list_comments(post_id, page, limit).await?;

    Ok(Json(ApiResponse::success(PageDto {
        items: comments.into_iter().map(CommentDto::from).collect(),
        pagination: PaginationMeta::new(page, limit, total),
    })))
}

/// GET /posts/{post_id}/comments/{id}
pub async fn get_comment(
    State(state): State<Arc<AppState>>,
    Path((post_id, id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse<CommentDto>>, ApiError> {
    let comment = state
        .store()
        .get_comment(post_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", id))?;

    Ok(Json(ApiResponse::success(CommentDto::from(comment))))
}

/// POST /posts/{post_id}/comments. Bumps the post comment counter.
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(post_id): Path<i32>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Response, ApiError> {
    let content = validate_non_empty(&payload.content, "Content")?;

    if state.store().get_post(post_id).await?.is_none() {
        return Err(ApiError::not_found("Post", post_id));
    }

    if let Some(parent_id) = payload.parent_comment_id
        && state.store().get_comment(post_id, parent_id).await?.is_none()
    {
        return Err(ApiError::not_found("Parent comment", parent_id));
    }

    let comment = state
        .store()
        .create_comment(post_id, user.id, content, payload.parent_comment_id)
        .await?;

    let body = Json(ApiResponse::success(CommentDto::from(comment)));
    Ok((StatusCode::CREATED, body).into_response())
}

/// PUT /posts/{post_id}/comments/{id}. Owner only; marks the comment edited.
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((post_id, id)): Path<(i32, i32)>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<ApiResponse<CommentDto>>, ApiError> {
    let content = validate_non_empty(&payload.content, "Content")?;

    let existing = state
        .store()
        .get_comment(post_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", id))?;

    require_owner(&user, existing.user_id)?;

    let comment = state
        .store()
        .update_comment(post_id, id, content)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", id))?;

    Ok(Json(ApiResponse::success(CommentDto::from(comment))))
}

/// DELETE /posts/{post_id}/comments/{id}. Owner or admin/moderator.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((post_id, id)): Path<(i32, i32)>,
) -> Result<Response, ApiError> {
    let existing = state
        .store()
        .get_comment(post_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment", id))?;

    require_owner_or_role(&user, existing.user_id, &[Role::Admin, Role::Moderator])?;

    state.store().delete_comment(post_id, id).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

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
use super::{ApiError, ApiResponse, AppState, PageDto, PaginationMeta, PostDto};
use crate::db::{NewPost, Role};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: String,
    pub content: String,
    pub category: String,
}

/// GET /posts. Public listing, newest first. An empty page is a normal
/// result, not an error.
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PageDto<PostDto>>>, ApiError> {
    let pagination = state.config().read().await.pagination.clone();
    let (page, limit) = query.resolve(&pagination);

    let (posts, total) = state.store().list_posts(page, limit).await?;

    Ok(Json(ApiResponse::success(PageDto {
        items: posts.into_iter().map(PostDto::from).collect(),
        pagination: PaginationMeta::new(page, limit, total),
    })))
}

/// GET /posts/{id}. Records the view.
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    let post = state
        .store()
        .get_post_and_record_view(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    Ok(Json(ApiResponse::success(PostDto::from(post))))
}

/// POST /posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Response, ApiError> {
    let title = validate_non_empty(&payload.title, "Title")?;
    let content = validate_non_empty(&payload.content, "Content")?;
    let category = validate_non_empty(&payload.category, "Category")?;

    let post = state
        .store()
        .create_post(NewPost {
            title,
            content,
            author: &user.name,
            category,
            user_id: user.id,
        })
        .await?;

    tracing::info!("User {} created post {}", user.id, post.id);

    let body = Json(ApiResponse::success(PostDto::from(post)));
    Ok((StatusCode::CREATED, body).into_response())
}

/// PUT /posts/{id}. Owner only.
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    let title = validate_non_empty(&payload.title, "Title")?;
    let content = validate_non_empty(&payload.content, "Content")?;
    let category = validate_non_empty(&payload.category, "Category")?;

    let existing = state
        .store()
        .get_post(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    require_owner(&user, existing.user_id)?;

    let post = state
        .store()
        .update_post(id, title, content, category)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    Ok(Json(ApiResponse::success(PostDto::from(post))))
}

/// DELETE /posts/{id}. Owner, or an admin/moderator.
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let existing = state
        .store()
        .get_post(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    require_owner_or_role(&user, existing.user_id, &[Role::Admin, Role::Moderator])?;

    state.store().delete_post(id).await?;

    tracing::info!("User {} deleted post {}", user.id, id);

    Ok(StatusCode::NO_CONTENT.into_response())
}

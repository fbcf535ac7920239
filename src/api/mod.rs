use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{OneTimeCodes, TokenIssuer};
use crate::config::Config;
use crate::db::Store;
use crate::services::Mailer;
use crate::state::SharedState;

mod access;
mod assets;
pub mod auth;
pub mod comments;
mod error;
pub mod posts;
pub mod system;
mod types;
pub mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenIssuer> {
        &self.shared.tokens
    }

    #[must_use]
    pub fn codes(&self) -> &OneTimeCodes {
        &self.shared.codes
    }

    #[must_use]
    pub fn mailer(&self) -> &Arc<Mailer> {
        &self.shared.mailer
    }
}

pub fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = {
        let config = state.config().read().await;
        config.server.cors_allowed_origins.clone()
    };

    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::send_forgot_password_code))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/posts", get(posts::list_posts))
        .route("/system/status", get(system::get_status));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(create_protected_router(state.clone()))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .fallback(assets::serve_asset)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/verification-code", post(auth::send_verification_code))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/users", get(users::list_users))
        .route("/users/me", patch(users::update_me))
        .route("/users/me/password", patch(users::update_password))
        .route("/users/me", delete(users::delete_me))
        .route("/posts", post(posts::create_post))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}", put(posts::update_post))
        .route("/posts/{id}", delete(posts::delete_post))
        .route("/posts/{post_id}/comments", get(comments::list_comments))
        .route("/posts/{post_id}/comments", post(comments::create_comment))
        .route("/posts/{post_id}/comments/{id}", get(comments::get_comment))
        .route("/posts/{post_id}/comments/{id}", put(comments::update_comment))
        .route(
            "/posts/{post_id}/comments/{id}",
            delete(comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

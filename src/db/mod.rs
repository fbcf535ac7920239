use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::comment::{Comment, CommentRepository};
pub use repositories::post::{NewPost, Post, PostRepository};
pub use repositories::user::{NewUser, PendingCode, Role, User, UserRepository};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> UserRepository {
        UserRepository::new(self.conn.clone())
    }

    fn post_repo(&self) -> PostRepository {
        PostRepository::new(self.conn.clone())
    }

    fn comment_repo(&self) -> CommentRepository {
        CommentRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn create_user(&self, new: NewUser<'_>, security: &SecurityConfig) -> Result<User> {
        self.user_repo().create(new, security).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn email_in_use(&self, email: &str, exclude: Option<i32>) -> Result<bool> {
        self.user_repo().email_in_use(email, exclude).await
    }

    pub async fn username_in_use(&self, username: &str, exclude: Option<i32>) -> Result<bool> {
        self.user_repo().username_in_use(username, exclude).await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn verify_user_password_by_id(&self, id: i32, password: &str) -> Result<bool> {
        self.user_repo().verify_password_by_id(id, password).await
    }

    pub async fn list_users(&self, page: u64, limit: u64) -> Result<(Vec<User>, u64)> {
        self.user_repo().list(page, limit).await
    }

    pub async fn update_user_profile(
        &self,
        id: i32,
        name: Option<&str>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        self.user_repo()
            .update_profile(id, name, username, email)
            .await
    }

    pub async fn update_user_password(
        &self,
        id: i32,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(id, new_password, security)
            .await
    }

    pub async fn set_verification_code(&self, id: i32, digest: &str) -> Result<()> {
        self.user_repo().set_verification_code(id, digest).await
    }

    pub async fn verification_state(&self, id: i32) -> Result<PendingCode> {
        self.user_repo().verification_state(id).await
    }

    pub async fn mark_user_verified(&self, id: i32) -> Result<()> {
        self.user_repo().mark_verified(id).await
    }

    pub async fn set_reset_code(&self, email: &str, digest: &str) -> Result<()> {
        self.user_repo().set_reset_code(email, digest).await
    }

    pub async fn reset_state(&self, email: &str) -> Result<Option<PendingCode>> {
        self.user_repo().reset_state(email).await
    }

    pub async fn reset_user_password(
        &self,
        email: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .reset_password(email, new_password, security)
            .await
    }

    pub async fn deactivate_user(&self, id: i32) -> Result<bool> {
        self.user_repo().deactivate(id).await
    }

    // ========================================================================
    // Posts
    // ========================================================================

    pub async fn create_post(&self, new: NewPost<'_>) -> Result<Post> {
        self.post_repo().create(new).await
    }

    pub async fn get_post(&self, id: i32) -> Result<Option<Post>> {
        self.post_repo().get(id).await
    }

    pub async fn get_post_and_record_view(&self, id: i32) -> Result<Option<Post>> {
        self.post_repo().get_and_record_view(id).await
    }

    pub async fn list_posts(&self, page: u64, limit: u64) -> Result<(Vec<Post>, u64)> {
        self.post_repo().list(page, limit).await
    }

    pub async fn update_post(
        &self,
        id: i32,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<Option<Post>> {
        self.post_repo().update(id, title, content, category).await
    }

    pub async fn delete_post(&self, id: i32) -> Result<bool> {
        self.post_repo().delete(id).await
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub async fn create_comment(
        &self,
        post_id: i32,
        user_id: i32,
        content: &str,
        parent_comment_id: Option<i32>,
    ) -> Result<Comment> {
        let comment = self
            .comment_repo()
            .create(post_id, user_id, content, parent_comment_id)
            .await?;
        // Not transactional with the insert; acceptable drift for this domain.
        self.post_repo().adjust_comment_count(post_id, 1).await?;
        Ok(comment)
    }

    pub async fn get_comment(&self, post_id: i32, id: i32) -> Result<Option<Comment>> {
        self.comment_repo().get(post_id, id).await
    }

    pub async fn list_comments(
        &self,
        post_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Comment>, u64)> {
        self.comment_repo().list_for_post(post_id, page, limit).await
    }

    pub async fn update_comment(
        &self,
        post_id: i32,
        id: i32,
        content: &str,
    ) -> Result<Option<Comment>> {
        self.comment_repo().update(post_id, id, content).await
    }

    pub async fn delete_comment(&self, post_id: i32, id: i32) -> Result<bool> {
        let deleted = self.comment_repo().delete(post_id, id).await?;
        if deleted {
            self.post_repo().adjust_comment_count(post_id, -1).await?;
        }
        Ok(deleted)
    }
}

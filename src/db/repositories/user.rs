use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::{prelude::*, users};

/// Account role. Stored as a lowercase string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Editor,
    Moderator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Moderator => "moderator",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "editor" => Some(Self::Editor),
            "moderator" => Some(Self::Moderator),
            _ => None,
        }
    }
}

/// User data returned from the repository. The password hash and pending
/// code digests never leave this module.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
    pub password_changed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// True if the password was changed after the given unix second.
    /// Used to reject tokens issued before a password change.
    #[must_use]
    pub fn password_changed_after(&self, unix_seconds: i64) -> bool {
        self.password_changed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .is_some_and(|changed| changed.timestamp() > unix_seconds)
    }
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            username: model.username,
            email: model.email,
            role: Role::parse(&model.role).unwrap_or(Role::User),
            verified: model.verified,
            password_changed_at: model.password_changed_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Stored state of a pending one-time code.
#[derive(Debug, Clone, Default)]
pub struct PendingCode {
    pub digest: Option<String>,
    pub sent_at: Option<String>,
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub role: Role,
    pub password: &'a str,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Active-user lookup. Soft-deleted accounts are invisible everywhere.
    async fn find_active_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .filter(users::Column::Active.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query user by id")
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::Active.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn create(&self, new: NewUser<'_>, security: &SecurityConfig) -> Result<User> {
        let password = new.password.to_string();
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = Utc::now().to_rfc3339();
        let active_model = users::ActiveModel {
            name: Set(new.name.to_string()),
            username: Set(new.username.to_string()),
            email: Set(new.email.to_string()),
            role: Set(new.role.as_str().to_string()),
            password_hash: Set(password_hash),
            verified: Set(false),
            active: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active_model
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        Ok(self.find_active_by_id(id).await?.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.find_active_by_email(email).await?.map(User::from))
    }

    /// True if an active user other than `exclude` already uses this email.
    pub async fn email_in_use(&self, email: &str, exclude: Option<i32>) -> Result<bool> {
        let mut query = Users::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::Active.eq(true));
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id));
        }
        Ok(query.count(&self.conn).await? > 0)
    }

    pub async fn username_in_use(&self, username: &str, exclude: Option<i32>) -> Result<bool> {
        let mut query = Users::find()
            .filter(users::Column::Username.eq(username))
            .filter(users::Column::Active.eq(true));
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id));
        }
        Ok(query.count(&self.conn).await? > 0)
    }

    /// Verifies credentials and returns the user on success.
    /// Argon2 verification runs on a blocking task; it is CPU-bound and
    /// would stall the async runtime otherwise.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(model) = self.find_active_by_email(email).await? else {
            return Ok(None);
        };

        let password_hash = model.password_hash.clone();
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid.then(|| User::from(model)))
    }

    /// Verifies by user id rather than email; used by the password-change flow.
    pub async fn verify_password_by_id(&self, id: i32, password: &str) -> Result<bool> {
        let Some(model) = self.find_active_by_id(id).await? else {
            return Ok(false);
        };

        let password_hash = model.password_hash;
        let password = password.to_string();

        task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }

    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<User>, u64)> {
        let total = Users::find()
            .filter(users::Column::Active.eq(true))
            .count(&self.conn)
            .await?;

        let rows = Users::find()
            .filter(users::Column::Active.eq(true))
            .order_by_desc(users::Column::CreatedAt)
            .offset(super::page_offset(page, limit))
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok((rows.into_iter().map(User::from).collect(), total))
    }

    /// Applies the allowed profile updates. Uniqueness is checked by the
    /// caller; the column constraints are the backstop.
    pub async fn update_profile(
        &self,
        id: i32,
        name: Option<&str>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        let Some(model) = self.find_active_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = model.into();
        if let Some(name) = name {
            active.name = Set(name.to_string());
        }
        if let Some(username) = username {
            active.username = Set(username.to_string());
        }
        if let Some(email) = email {
            active.email = Set(email.to_string());
        }
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(User::from(model)))
    }

    /// Rehashes and stores the new password, bumping `password_changed_at`
    /// so tokens issued before this instant stop being accepted.
    pub async fn update_password(
        &self,
        id: i32,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        let model = self
            .find_active_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let password = new_password.to_string();
        let security = security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = model.into();
        active.password_hash = Set(new_hash);
        active.password_changed_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn set_verification_code(&self, id: i32, digest: &str) -> Result<()> {
        let model = self
            .find_active_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let now = Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = model.into();
        active.verification_code = Set(Some(digest.to_string()));
        active.verification_code_sent_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn verification_state(&self, id: i32) -> Result<PendingCode> {
        let model = self
            .find_active_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        Ok(PendingCode {
            digest: model.verification_code,
            sent_at: model.verification_code_sent_at,
        })
    }

    /// One-time use: flips the verified flag and clears the pending code.
    pub async fn mark_verified(&self, id: i32) -> Result<()> {
        let model = self
            .find_active_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = model.into();
        active.verified = Set(true);
        active.verification_code = Set(None);
        active.verification_code_sent_at = Set(None);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn set_reset_code(&self, email: &str, digest: &str) -> Result<()> {
        let model = self
            .find_active_by_email(email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {email}"))?;

        let now = Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = model.into();
        active.reset_code = Set(Some(digest.to_string()));
        active.reset_code_sent_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn reset_state(&self, email: &str) -> Result<Option<PendingCode>> {
        let Some(model) = self.find_active_by_email(email).await? else {
            return Ok(None);
        };

        Ok(Some(PendingCode {
            digest: model.reset_code,
            sent_at: model.reset_code_sent_at,
        }))
    }

    /// Completes a password reset: stores the new hash, clears the pending
    /// code, and bumps `password_changed_at`.
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        let model = self
            .find_active_by_email(email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {email}"))?;

        let password = new_password.to_string();
        let security = security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = model.into();
        active.password_hash = Set(new_hash);
        active.reset_code = Set(None);
        active.reset_code_sent_at = Set(None);
        active.password_changed_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Soft delete. The row stays for referential integrity; every lookup
    /// in this repository filters it out.
    pub async fn deactivate(&self, id: i32) -> Result<bool> {
        let Some(model) = self.find_active_by_id(id).await? else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = model.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(true)
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, security: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        security.argon2_memory_cost_kib,
        security.argon2_time_cost,
        security.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_roundtrip() {
        for role in [Role::User, Role::Admin, Role::Editor, Role::Moderator] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn password_changed_after_comparison() {
        let changed_at = Utc::now();
        let user = User {
            id: 1,
            name: "Test".to_string(),
            username: "test".to_string(),
            email: "t@example.com".to_string(),
            role: Role::User,
            verified: true,
            password_changed_at: Some(changed_at.to_rfc3339()),
            created_at: changed_at.to_rfc3339(),
            updated_at: changed_at.to_rfc3339(),
        };

        assert!(user.password_changed_after(changed_at.timestamp() - 10));
        assert!(!user.password_changed_after(changed_at.timestamp() + 10));

        let never_changed = User {
            password_changed_at: None,
            ..user
        };
        assert!(!never_changed.password_changed_after(0));
    }
}

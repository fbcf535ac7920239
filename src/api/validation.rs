use serde::Deserialize;

use super::ApiError;
use crate::config::PaginationConfig;

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    let valid = trimmed.len() <= 254
        && trimmed
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));

    if !valid {
        return Err(ApiError::validation("Invalid email address"));
    }
    Ok(trimmed)
}

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();
    if !(3..=30).contains(&trimmed.len()) {
        return Err(ApiError::validation(
            "Username must be between 3 and 30 characters",
        ));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, hyphens, and underscores",
        ));
    }
    Ok(trimmed)
}

pub fn validate_name(name: &str) -> Result<&str, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    if trimmed.len() > 100 {
        return Err(ApiError::validation("Name must be 100 characters or less"));
    }
    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    if password.len() > 128 {
        return Err(ApiError::validation(
            "Password must be 128 characters or less",
        ));
    }
    Ok(password)
}

pub fn validate_code(code: &str) -> Result<&str, ApiError> {
    let trimmed = code.trim();
    if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("Code must be a 6-digit number"));
    }
    Ok(trimmed)
}

pub fn validate_non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed)
}

/// `?page=&limit=` query parameters shared by the listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    /// Clamps to sane bounds instead of erroring on out-of-range values.
    #[must_use]
    pub fn resolve(&self, config: &PaginationConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit);
        (page, limit)
    }
}

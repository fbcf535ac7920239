//! Route-level ownership/role checks, applied after the auth middleware has
//! resolved the caller.

use super::ApiError;
use crate::db::{Role, User};

/// Owner always passes; anyone else needs a role from the allowed set.
pub fn require_owner_or_role(
    caller: &User,
    owner_id: i32,
    allowed_roles: &[Role],
) -> Result<(), ApiError> {
    if caller.id == owner_id {
        return Ok(());
    }
    if allowed_roles.contains(&caller.role) {
        return Ok(());
    }
    Err(ApiError::forbidden())
}

/// Owner-only variant for routes where no role may override.
pub fn require_owner(caller: &User, owner_id: i32) -> Result<(), ApiError> {
    require_owner_or_role(caller, owner_id, &[])
}

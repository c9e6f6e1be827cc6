/// Role checks for protected user routes
///
/// Two roles, no hierarchy beyond "an admin may read anyone".

use crate::auth::Claims;
use crate::error::{AppError, AuthError};
use crate::store::Role;

/// Require the caller to hold `role`
pub fn require_role(claims: &Claims, role: Role) -> Result<(), AppError> {
    if claims.role != role {
        tracing::warn!(user_id = %claims.sub, required = %role, "Role check failed");
        return Err(AuthError::Forbidden.into());
    }
    Ok(())
}

/// Admins may access any user; everyone else only themselves
pub fn authorize_user_access(claims: &Claims, user_id: &str) -> Result<(), AppError> {
    match claims.role {
        Role::Admin => Ok(()),
        Role::User if claims.sub == user_id => Ok(()),
        Role::User => {
            tracing::warn!(user_id = %claims.sub, target = %user_id, "Access to another user denied");
            Err(AuthError::Forbidden.into())
        }
    }
}

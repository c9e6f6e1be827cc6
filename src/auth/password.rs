/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and the password length policy.
/// bcrypt only reads the first 72 bytes of its input, so anything longer is
/// refused outright instead of being silently truncated.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt input limit, in bytes
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// One-way credential hasher with a fixed bcrypt cost
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }

    /// Hash a password with a fresh random salt
    ///
    /// # Errors
    /// Returns `AppError::Validation` for input over 72 bytes and
    /// `AppError::Internal` if bcrypt fails
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(too_many_bytes().into());
        }
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a candidate password against a stored hash
    ///
    /// A malformed stored hash or an over-long candidate counts as a mismatch
    /// so callers cannot tell the cases apart.
    pub fn verify(&self, hashed: &str, candidate: &str) -> bool {
        if candidate.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match verify(candidate, hashed) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Stored password hash could not be verified: {}", e);
                false
            }
        }
    }
}

fn too_many_bytes() -> ValidationError {
    ValidationError::TooManyBytes("password".to_string(), MAX_PASSWORD_BYTES)
}

/// At least 8 characters and at most 72 bytes
pub fn validate_password_length(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(too_many_bytes());
    }

    Ok(())
}

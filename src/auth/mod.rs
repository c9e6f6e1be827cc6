/// Authentication module
///
/// Password hashing, JWT issuance/validation and persistence of the current
/// token pair.

mod access;
mod claims;
mod jwt;
mod password;
mod session_store;

pub use access::{authorize_user_access, require_role};
pub use claims::{Claims, TokenIdentity, TokenKind};
pub use jwt::{TokenFailure, TokenIssuer, TokenPair};
pub use password::{
    validate_password_length, PasswordHasher, MAX_BCRYPT_COST, MAX_PASSWORD_BYTES,
    MIN_BCRYPT_COST, MIN_PASSWORD_LENGTH,
};
pub use session_store::persist_tokens;

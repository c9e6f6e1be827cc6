/// JWT Claims structure
///
/// The payload signed into every access and refresh token: who the token was
/// issued for, what it may be used for, and when it stops being valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Role;

/// What a token may be presented for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity attributes a token pair is issued from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Unique token id, so two tokens issued in the same second still differ
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Build claims valid from `issued_at` for `validity_seconds`
    pub fn new(
        identity: &TokenIdentity,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        validity_seconds: i64,
        issuer: &str,
    ) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
            kind,
            jti: Uuid::new_v4().to_string(),
            iat,
            exp: iat + validity_seconds,
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Strictly past `exp`; a token is still valid during its last second
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }
}

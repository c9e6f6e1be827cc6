/// User store
///
/// The account subsystem reads and writes identity records only through the
/// `UserStore` trait. `PostgresUserStore` backs production; `InMemoryUserStore`
/// backs tests and local runs without a database.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::auth::{TokenIdentity, TokenPair};
use crate::error::{StoreError, ValidationError};

pub use memory::InMemoryUserStore;
pub use postgres::PostgresUserStore;

/// Account role; the only two roles the system knows
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const ALLOWED: &'static str = "ADMIN, USER";

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    /// Exact match only; a missing or unknown role is never defaulted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            _ => Err(ValidationError::NotAllowed(
                "user_type".to_string(),
                Role::ALLOWED.to_string(),
            )),
        }
    }
}

/// Persisted identity record
///
/// `password` holds the bcrypt hash and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub user_type: Role,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn identity(&self) -> TokenIdentity {
        TokenIdentity {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.user_type,
        }
    }

    pub fn token_pair(&self) -> Option<TokenPair> {
        match (&self.token, &self.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(TokenPair {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn count_by_email(&self, email: &str) -> Result<i64, StoreError>;

    async fn count_by_phone(&self, phone: &str) -> Result<i64, StoreError>;

    /// Insert a complete record, tokens included; returns its `user_id`
    async fn insert_user(&self, user: &UserRecord) -> Result<String, StoreError>;

    /// Create or overwrite the token fields of `user_id` and bump `updated_at`
    ///
    /// # Errors
    /// `StoreError::NotFound` when no record has this `user_id`
    async fn upsert_tokens(
        &self,
        user_id: &str,
        tokens: &TokenPair,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Overwrite profile fields (names, email, phone, password hash,
    /// `updated_at`); role and tokens are left alone
    ///
    /// # Errors
    /// `StoreError::NotFound` for an unknown `user_id`, `StoreError::Duplicate`
    /// when the new email or phone belongs to another record
    async fn update_profile(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Records ordered by creation time
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<UserRecord>, StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;
}

/// Run a store operation under `limit`; elapsing is a failure, never retried
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| StoreError::Timeout(limit.as_secs()))?
}

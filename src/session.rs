/// Session orchestration
///
/// Registration, login and refresh compose the credential hasher, the token
/// issuer and the store updater. `SessionService` is the explicit context
/// object holding the store handle and signing keys; it is built once in
/// `main` before the server accepts requests.
///
/// Login is issue -> persist -> re-read without a lock. Two concurrent logins
/// for the same user may each read back the other's pair; the stored pair is
/// always one complete pair from one of them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{
    authorize_user_access, persist_tokens, require_role, validate_password_length, Claims,
    PasswordHasher, TokenIssuer, TokenKind,
};
use crate::error::{AppError, AuthError, StoreError, ValidationError};
use crate::store::{with_timeout, Role, UserRecord, UserStore};
use crate::validators::{is_valid_email, is_valid_name, is_valid_phone};

const ALREADY_EXISTS: &str = "This email or phone number already exists";
const DEFAULT_RECORDS_PER_PAGE: i64 = 10;

/// Registration payload; every field is required
#[derive(Deserialize, Default)]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub user_type: Option<String>,
}

struct NewAccount {
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    password: String,
    role: Role,
}

fn required(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ValidationError::EmptyField(field.to_string()))
}

impl RegisterRequest {
    fn validate(self) -> Result<NewAccount, ValidationError> {
        let first_name = is_valid_name("first_name", &required(self.first_name, "first_name")?)?;
        let last_name = is_valid_name("last_name", &required(self.last_name, "last_name")?)?;
        let email = is_valid_email(&required(self.email, "email")?)?;
        let phone = is_valid_phone(&required(self.phone, "phone")?)?;

        let password = required(self.password, "password")?;
        validate_password_length(&password)?;

        let role = required(self.user_type, "user_type")?.parse::<Role>()?;

        Ok(NewAccount {
            first_name,
            last_name,
            email,
            phone,
            password,
            role,
        })
    }
}

/// Login payload
#[derive(Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Profile update payload; absent fields keep their stored value
///
/// The role cannot be changed here.
#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

struct ProfileChanges {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    password: Option<String>,
}

impl UpdateUserRequest {
    fn validate(self) -> Result<ProfileChanges, ValidationError> {
        let changes = ProfileChanges {
            first_name: self
                .first_name
                .map(|v| is_valid_name("first_name", &v))
                .transpose()?,
            last_name: self
                .last_name
                .map(|v| is_valid_name("last_name", &v))
                .transpose()?,
            email: self.email.map(|v| is_valid_email(&v)).transpose()?,
            phone: self.phone.map(|v| is_valid_phone(&v)).transpose()?,
            password: self
                .password
                .map(|v| validate_password_length(&v).map(|_| v))
                .transpose()?,
        };

        let empty = changes.first_name.is_none()
            && changes.last_name.is_none()
            && changes.email.is_none()
            && changes.phone.is_none()
            && changes.password.is_none();
        if empty {
            return Err(ValidationError::EmptyField("update".to_string()));
        }

        Ok(changes)
    }
}

/// Refresh payload
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub inserted_id: String,
}

/// One page of users
#[derive(Debug, Serialize, Deserialize)]
pub struct UserPage {
    pub total_count: i64,
    pub user_items: Vec<UserRecord>,
}

/// Page selection with the defaults applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub record_per_page: i64,
    pub page: i64,
}

impl Pagination {
    /// Missing or non-positive values fall back to 10 records, page 1
    pub fn new(record_per_page: Option<i64>, page: Option<i64>) -> Self {
        Self {
            record_per_page: record_per_page
                .filter(|n| *n >= 1)
                .unwrap_or(DEFAULT_RECORDS_PER_PAGE),
            page: page.filter(|n| *n >= 1).unwrap_or(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.record_per_page)
    }
}

pub struct SessionService {
    store: Arc<dyn UserStore>,
    issuer: TokenIssuer,
    hasher: PasswordHasher,
    store_timeout: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn UserStore>,
        issuer: TokenIssuer,
        hasher: PasswordHasher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            issuer,
            hasher,
            store_timeout,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Create an account and its first token pair in a single insert
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, AppError> {
        let account = request.validate()?;

        let email_count =
            with_timeout(self.store_timeout, self.store.count_by_email(&account.email)).await?;
        let phone_count =
            with_timeout(self.store_timeout, self.store.count_by_phone(&account.phone)).await?;
        if email_count > 0 || phone_count > 0 {
            return Err(AppError::Conflict(ALREADY_EXISTS.to_string()));
        }

        let password_hash = self.hash_password(account.password).await?;

        let now = Utc::now();
        let mut record = UserRecord {
            user_id: Uuid::new_v4().to_string(),
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            phone: account.phone,
            user_type: account.role,
            password: password_hash,
            token: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        let tokens = self.issuer.issue_token_pair(&record.identity())?;
        record.token = Some(tokens.access_token);
        record.refresh_token = Some(tokens.refresh_token);

        let inserted_id = with_timeout(self.store_timeout, self.store.insert_user(&record))
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                StoreError::Duplicate(_) => AppError::Conflict(ALREADY_EXISTS.to_string()),
                other => AppError::Store(other),
            })?;

        tracing::info!(user_id = %inserted_id, role = %record.user_type, "User registered");
        Ok(RegisterResponse { inserted_id })
    }

    /// Check credentials, issue and persist a fresh pair, return the stored record
    pub async fn login(&self, request: LoginRequest) -> Result<UserRecord, AppError> {
        let email = required(request.email, "email")?;
        let password = required(request.password, "password")?;

        let found = with_timeout(self.store_timeout, self.store.find_by_email(email.trim()))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(found.password.clone(), password).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issuer.issue_token_pair(&found.identity())?;
        persist_tokens(self.store.as_ref(), &found.user_id, &tokens, self.store_timeout).await?;

        let user = self.reload(&found.user_id).await?;
        tracing::info!(user_id = %user.user_id, "User logged in");
        Ok(user)
    }

    /// Trade the current refresh token for a new pair
    ///
    /// Only the refresh token stored with the user is accepted; a pair that
    /// a later login superseded is rejected.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<UserRecord, AppError> {
        let claims = self
            .issuer
            .validate_kind(&request.refresh_token, TokenKind::Refresh)?;

        let found = with_timeout(self.store_timeout, self.store.find_by_user_id(claims.user_id()))
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if found.refresh_token.as_deref() != Some(request.refresh_token.as_str()) {
            tracing::warn!(user_id = %found.user_id, "Superseded refresh token presented");
            return Err(AuthError::TokenInvalid.into());
        }

        let tokens = self.issuer.issue_token_pair(&found.identity())?;
        persist_tokens(self.store.as_ref(), &found.user_id, &tokens, self.store_timeout).await?;

        let user = self.reload(&found.user_id).await?;
        tracing::info!(user_id = %user.user_id, "Session refreshed");
        Ok(user)
    }

    /// Fetch one user on behalf of `caller`
    pub async fn get_user(&self, caller: &Claims, user_id: &str) -> Result<UserRecord, AppError> {
        authorize_user_access(caller, user_id)?;
        self.reload(user_id).await
    }

    /// Fetch one user by email on behalf of `caller`
    ///
    /// A non-admin asking for an unknown email gets `Forbidden`, the same as
    /// for someone else's, so existence is not revealed.
    pub async fn get_user_by_email(
        &self,
        caller: &Claims,
        email: &str,
    ) -> Result<UserRecord, AppError> {
        let email = is_valid_email(email)?;

        match with_timeout(self.store_timeout, self.store.find_by_email(&email)).await? {
            Some(user) => {
                authorize_user_access(caller, &user.user_id)?;
                Ok(user)
            }
            None => {
                require_role(caller, Role::Admin)?;
                Err(StoreError::NotFound(format!("user {}", email)).into())
            }
        }
    }

    /// Change profile fields of `user_id`
    ///
    /// A new email or phone must not belong to anyone else; a new password is
    /// re-hashed. Tokens already issued keep the old profile claims until the
    /// next login or refresh.
    pub async fn update_user(
        &self,
        caller: &Claims,
        user_id: &str,
        request: UpdateUserRequest,
    ) -> Result<UserRecord, AppError> {
        authorize_user_access(caller, user_id)?;
        let changes = request.validate()?;
        let mut user = self.reload(user_id).await?;

        if let Some(email) = changes.email {
            if email != user.email {
                let taken =
                    with_timeout(self.store_timeout, self.store.count_by_email(&email)).await?;
                if taken > 0 {
                    return Err(AppError::Conflict(ALREADY_EXISTS.to_string()));
                }
                user.email = email;
            }
        }
        if let Some(phone) = changes.phone {
            if phone != user.phone {
                let taken =
                    with_timeout(self.store_timeout, self.store.count_by_phone(&phone)).await?;
                if taken > 0 {
                    return Err(AppError::Conflict(ALREADY_EXISTS.to_string()));
                }
                user.phone = phone;
            }
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(password) = changes.password {
            user.password = self.hash_password(password).await?;
        }
        user.updated_at = Utc::now();

        with_timeout(self.store_timeout, self.store.update_profile(&user))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AppError::Conflict(ALREADY_EXISTS.to_string()),
                other => AppError::Store(other),
            })?;

        let user = self.reload(user_id).await?;
        tracing::info!(user_id = %user.user_id, updated_by = %caller.sub, "User profile updated");
        Ok(user)
    }

    /// Page through all users; admins only
    pub async fn list_users(
        &self,
        caller: &Claims,
        pagination: Pagination,
    ) -> Result<UserPage, AppError> {
        require_role(caller, Role::Admin)?;

        let total_count = with_timeout(self.store_timeout, self.store.count_users()).await?;
        let user_items = with_timeout(
            self.store_timeout,
            self.store
                .list_users(pagination.offset(), pagination.record_per_page),
        )
        .await?;

        Ok(UserPage {
            total_count,
            user_items,
        })
    }

    async fn reload(&self, user_id: &str) -> Result<UserRecord, AppError> {
        with_timeout(self.store_timeout, self.store.find_by_user_id(user_id))
            .await?
            .ok_or_else(|| AppError::Store(StoreError::NotFound(format!("user {}", user_id))))
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, hashed: String, candidate: String) -> Result<bool, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&hashed, &candidate))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Role, UserRecord, UserStore};
use crate::auth::TokenPair;
use crate::error::StoreError;

const SELECT_USER: &str = r#"
    SELECT u.user_id, u.email, u.first_name, u.last_name, u.phone, u.user_type,
           u.password_hash, t.token, t.refresh_token, u.created_at, u.updated_at
    FROM users u
    LEFT JOIN user_tokens t ON t.user_id = u.user_id
"#;

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    user_type: String,
    password_hash: String,
    token: Option<String>,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let user_type = row.user_type.parse::<Role>().map_err(|_| {
            StoreError::Query(format!(
                "user {} has unknown user_type {:?}",
                row.user_id, row.user_type
            ))
        })?;

        Ok(UserRecord {
            user_id: row.user_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            user_type,
            password: row.password_hash,
            token: row.token,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed user store
///
/// Tokens live in `user_tokens`, one row per user, so a login overwrites the
/// previous pair instead of appending a new one.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("{} WHERE {}", SELECT_USER, clause);
        sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_one_where("u.email = $1", email).await
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_one_where("u.user_id = $1", user_id).await
    }

    async fn count_by_email(&self, email: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_phone(&self, phone: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<String, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, first_name, last_name, phone, user_type,
                               password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.user_type.as_str())
        .bind(&user.password)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut tx)
        .await?;

        if let (Some(token), Some(refresh_token)) = (&user.token, &user.refresh_token) {
            sqlx::query(
                r#"
                INSERT INTO user_tokens (user_id, token, refresh_token, updated_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&user.user_id)
            .bind(token)
            .bind(refresh_token)
            .bind(user.updated_at)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user.user_id.clone())
    }

    async fn upsert_tokens(
        &self,
        user_id: &str,
        tokens: &TokenPair,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE users SET updated_at = $1 WHERE user_id = $2")
            .bind(updated_at)
            .bind(user_id)
            .execute(&mut tx)
            .await?
            .rows_affected();

        if touched == 0 {
            // Dropping the transaction rolls it back
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO user_tokens (user_id, token, refresh_token, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token,
                refresh_token = EXCLUDED.refresh_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(updated_at)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_profile(&self, user: &UserRecord) -> Result<(), StoreError> {
        let touched = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, phone = $4,
                password_hash = $5, updated_at = $6
            WHERE user_id = $7
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(user.updated_at)
        .bind(&user.user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if touched == 0 {
            return Err(StoreError::NotFound(format!("user {}", user.user_id)));
        }
        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<UserRecord>, StoreError> {
        let query = format!(
            "{} ORDER BY u.created_at, u.user_id LIMIT $2 OFFSET $1",
            SELECT_USER
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(offset.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(UserRecord::try_from)
            .collect()
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

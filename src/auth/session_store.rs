/// Session persistence
///
/// Writes the latest token pair onto the user's record. The write is an
/// upsert on the token fields, so re-running it with the same pair leaves the
/// record unchanged apart from `updated_at`.

use chrono::Utc;
use std::time::Duration;

use crate::auth::TokenPair;
use crate::error::AppError;
use crate::store::{with_timeout, UserStore};

/// Persist `tokens` as the current pair of `user_id`
///
/// # Errors
/// Returns `AppError::Store` if the store rejects the write, has no such
/// user, or does not answer within `timeout`
pub async fn persist_tokens(
    store: &dyn UserStore,
    user_id: &str,
    tokens: &TokenPair,
    timeout: Duration,
) -> Result<(), AppError> {
    with_timeout(timeout, store.upsert_tokens(user_id, tokens, Utc::now())).await?;

    tracing::debug!(user_id = %user_id, "Session tokens persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{InMemoryUserStore, Role, UserRecord};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn store_with_user() -> InMemoryUserStore {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        store
            .insert_user(&UserRecord {
                user_id: "u1".into(),
                email: "a@x.com".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                phone: "555".into(),
                user_type: Role::User,
                password: "$2b$04$hash".into(),
                token: None,
                refresh_token: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        store
    }

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }
    }

    #[tokio::test]
    async fn test_persist_creates_missing_token_fields() {
        let store = store_with_user().await;
        persist_tokens(&store, "u1", &pair(), TIMEOUT).await.unwrap();

        let user = store.find_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(user.token_pair(), Some(pair()));
        assert!(user.updated_at >= user.created_at);
    }

    #[tokio::test]
    async fn test_persist_is_idempotent() {
        let store = store_with_user().await;

        persist_tokens(&store, "u1", &pair(), TIMEOUT).await.unwrap();
        let once = store.find_by_user_id("u1").await.unwrap().unwrap();
        persist_tokens(&store, "u1", &pair(), TIMEOUT).await.unwrap();
        let twice = store.find_by_user_id("u1").await.unwrap().unwrap();

        assert_eq!(once.token, twice.token);
        assert_eq!(once.refresh_token, twice.refresh_token);
        assert_eq!(once.email, twice.email);
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persist_supersedes_previous_pair() {
        let store = store_with_user().await;
        persist_tokens(&store, "u1", &pair(), TIMEOUT).await.unwrap();

        let next = TokenPair {
            access_token: "access-2".into(),
            refresh_token: "refresh-2".into(),
        };
        persist_tokens(&store, "u1", &next, TIMEOUT).await.unwrap();

        let user = store.find_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(user.token_pair(), Some(next));
    }

    #[tokio::test]
    async fn test_persist_for_unknown_user_fails() {
        let store = InMemoryUserStore::new();
        let err = persist_tokens(&store, "ghost", &pair(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::NotFound(_))));
    }
}

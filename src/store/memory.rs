use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{UserRecord, UserStore};
use crate::auth::TokenPair;
use crate::error::StoreError;

/// In-memory user store
///
/// `Clone` hands out another handle to the same map. Email and phone are kept
/// unique the same way the Postgres constraints keep them.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, UserRecord>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Connection("user store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock()?.get(user_id).cloned())
    }

    async fn count_by_email(&self, email: &str) -> Result<i64, StoreError> {
        Ok(self.lock()?.values().filter(|u| u.email == email).count() as i64)
    }

    async fn count_by_phone(&self, phone: &str) -> Result<i64, StoreError> {
        Ok(self.lock()?.values().filter(|u| u.phone == phone).count() as i64)
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<String, StoreError> {
        let mut users = self.lock()?;

        let clash = users.contains_key(&user.user_id)
            || users
                .values()
                .any(|u| u.email == user.email || u.phone == user.phone);
        if clash {
            return Err(StoreError::Duplicate(format!("user {}", user.user_id)));
        }

        users.insert(user.user_id.clone(), user.clone());
        Ok(user.user_id.clone())
    }

    async fn upsert_tokens(
        &self,
        user_id: &str,
        tokens: &TokenPair,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = self.lock()?;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        user.token = Some(tokens.access_token.clone());
        user.refresh_token = Some(tokens.refresh_token.clone());
        user.updated_at = updated_at;
        Ok(())
    }

    async fn update_profile(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.lock()?;

        let clash = users.values().any(|u| {
            u.user_id != user.user_id && (u.email == user.email || u.phone == user.phone)
        });
        if clash {
            return Err(StoreError::Duplicate(format!("user {}", user.user_id)));
        }

        let stored = users
            .get_mut(&user.user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.user_id)))?;
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.email = user.email.clone();
        stored.phone = user.phone.clone();
        stored.password = user.password.clone();
        stored.updated_at = user.updated_at;
        Ok(())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<UserRecord>, StoreError> {
        let mut users: Vec<UserRecord> = self.lock()?.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.lock()?.len() as i64)
    }
}

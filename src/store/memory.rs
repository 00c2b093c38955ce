//! In-memory stores
//!
//! Single-process only: the refresh store's rotation holds one mutex for
//! the whole check, mark and insert sequence, which is atomic within this
//! process and nowhere else. Use the Postgres stores for multi-instance
//! deployments.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use super::{ConsumeOutcome, CredentialStore, RefreshRecord, RefreshTokenStore, StoreError, UserCredential};

#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, UserCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserCredential) {
        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.insert(user.username.clone(), user);
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".to_string()))?;
        Ok(users.get(username).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<Uuid, RefreshRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<Uuid, RefreshRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("refresh store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(&self, record: RefreshRecord) -> Result<(), StoreError> {
        self.records()?.insert(record.token_id, record);
        Ok(())
    }

    async fn rotate(
        &self,
        token_id: Uuid,
        successor: RefreshRecord,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut records = self.records()?;
        let outcome = match records.get_mut(&token_id) {
            None => ConsumeOutcome::NotFound,
            Some(record) if record.revoked => ConsumeOutcome::AlreadyRevoked {
                user_id: record.user_id,
            },
            Some(record) if record.expires_at <= now => ConsumeOutcome::Expired {
                user_id: record.user_id,
            },
            Some(record) if record.user_id != successor.user_id => ConsumeOutcome::OwnerMismatch {
                user_id: record.user_id,
            },
            Some(record) => {
                record.revoked = true;
                ConsumeOutcome::Consumed {
                    user_id: record.user_id,
                }
            }
        };
        if let ConsumeOutcome::Consumed { .. } = outcome {
            records.insert(successor.token_id, successor);
        }
        Ok(outcome)
    }

    async fn revoke(&self, token_id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        Ok(match records.get_mut(&token_id) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn is_active(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .records()?
            .get(&token_id)
            .map(|record| record.is_active(now))
            .unwrap_or(false))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for record in self.records()?.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

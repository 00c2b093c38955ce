/// Storage collaborators
///
/// The session core only ever talks to these two capability traits. The
/// Postgres implementations back production; the in-memory ones back tests
/// and local runs.

mod memory;
mod postgres;

pub use memory::{InMemoryCredentialStore, InMemoryRefreshTokenStore};
pub use postgres::{PgCredentialStore, PgRefreshTokenStore};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// A user as the credential store knows it. Read-only to this service.
#[derive(Clone)]
pub struct UserCredential {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
}

/// Server-side state of one issued refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshRecord {
    pub fn new(token_id: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            token_id,
            user_id,
            expires_at,
            revoked: false,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Result of the compare-and-set performed by [`RefreshTokenStore::rotate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The record was active and is now revoked by this call; the successor
    /// has been stored.
    Consumed { user_id: Uuid },
    /// The record had already been revoked.
    AlreadyRevoked { user_id: Uuid },
    Expired { user_id: Uuid },
    /// The record is active but belongs to someone other than the
    /// successor's user. Nothing was changed.
    OwnerMismatch { user_id: Uuid },
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError>;
}

#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, record: RefreshRecord) -> Result<(), StoreError>;

    /// Atomically mark the active record `token_id` revoked and store
    /// `successor` in its place. Either both happen or neither does: an
    /// error leaves the old record as it was. Two concurrent calls for the
    /// same token id must never both observe `Consumed`.
    async fn rotate(
        &self,
        token_id: Uuid,
        successor: RefreshRecord,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Mark one record revoked. Returns whether it was still unrevoked.
    async fn revoke(&self, token_id: Uuid) -> Result<bool, StoreError>;

    async fn is_active(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Revoke every unrevoked record of a user. Returns how many were revoked.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete records that expired before `now`. Returns how many were deleted.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Run a store operation under a deadline.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(operation)),
    }
}

//! Postgres-backed stores
//!
//! Schema lives in `migrations/`. Rotation is a conditional
//! `UPDATE ... RETURNING` plus the successor's `INSERT` in one transaction,
//! so the compare-and-set holds across every process sharing the database
//! and a failed insert leaves the old record usable.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConsumeOutcome, CredentialStore, RefreshRecord, RefreshTokenStore, StoreError, UserCredential};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, username, password_hash)| UserCredential {
            user_id,
            username,
            password_hash,
        }))
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, record: RefreshRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.token_id)
        .bind(record.user_id)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rotate(
        &self,
        token_id: Uuid,
        successor: RefreshRecord,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $2
            WHERE token_id = $1 AND user_id = $3 AND revoked = false AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_id)
        .bind(now)
        .bind(successor.user_id)
        .fetch_optional(&mut tx)
        .await?;

        if let Some(user_id) = consumed {
            sqlx::query(
                r#"
                INSERT INTO refresh_tokens (token_id, user_id, expires_at, revoked, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(successor.token_id)
            .bind(successor.user_id)
            .bind(successor.expires_at)
            .bind(successor.revoked)
            .bind(now)
            .execute(&mut tx)
            .await?;

            tx.commit().await?;
            return Ok(ConsumeOutcome::Consumed { user_id });
        }

        // The conditional update matched nothing; find out why.
        let existing = sqlx::query_as::<_, (Uuid, bool, DateTime<Utc>)>(
            "SELECT user_id, revoked, expires_at FROM refresh_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&mut tx)
        .await?;
        tx.rollback().await?;

        Ok(match existing {
            None => ConsumeOutcome::NotFound,
            Some((user_id, true, _)) => ConsumeOutcome::AlreadyRevoked { user_id },
            Some((user_id, false, expires_at)) if expires_at <= now => ConsumeOutcome::Expired { user_id },
            Some((user_id, false, _)) => ConsumeOutcome::OwnerMismatch { user_id },
        })
    }

    async fn revoke(&self, token_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_id = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_active(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let active = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM refresh_tokens
                WHERE token_id = $1 AND revoked = false AND expires_at > $2
            )
            "#,
        )
        .bind(token_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(active)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE user_id = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

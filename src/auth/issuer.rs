/// Token Issuer and Refresh Rotation
///
/// Refresh tokens are:
/// - Signed JWTs whose `jti` names a server-side refresh record
/// - Single-use: every refresh consumes the record and issues a successor
/// - Revocable: a consumed token presented again revokes every refresh
///   record of its user, since either the client or an attacker holds a
///   copy of a token that was already exchanged

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::claims::TokenClaims;
use crate::auth::jwt::{TokenCodec, TokenError};
use crate::store::{bounded, ConsumeOutcome, RefreshRecord, RefreshTokenStore, StoreError};

/// Access/refresh token pair handed to the client
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("refresh token already used or revoked")]
    AlreadyRevoked { user_id: Uuid },
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token unknown")]
    Unknown,
    #[error("refresh token subject does not match its record")]
    SubjectMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    access_ttl: i64,
    refresh_ttl: i64,
    store_timeout: Duration,
}

impl TokenIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        access_ttl: i64,
        refresh_ttl: i64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            refresh_tokens,
            access_ttl,
            refresh_ttl,
            store_timeout,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    /// Sign a new pair for `user_id` along with the record that backs its
    /// refresh half. Nothing is stored yet.
    fn mint(&self, user_id: Uuid) -> Result<(TokenPair, RefreshRecord), TokenError> {
        // Whole seconds, so the record expires exactly when the token does.
        let now: DateTime<Utc> = Utc::now().trunc_subsecs(0);
        let token_id = Uuid::new_v4();
        let issuer = self.codec.issuer();

        let access = TokenClaims::access(user_id, now.timestamp(), self.access_ttl, issuer);
        let refresh = TokenClaims::refresh(user_id, token_id, now.timestamp(), self.refresh_ttl, issuer);

        let pair = TokenPair {
            access_token: self.codec.encode(&access)?,
            refresh_token: self.codec.encode(&refresh)?,
        };
        let record = RefreshRecord::new(token_id, user_id, now + chrono::Duration::seconds(self.refresh_ttl));

        Ok((pair, record))
    }

    /// Issue a fresh pair and record the refresh half as active
    pub async fn issue(&self, user_id: Uuid) -> Result<TokenPair, RotationError> {
        let (pair, record) = self.mint(user_id)?;
        let token_id = record.token_id;

        bounded(
            self.store_timeout,
            "refresh record insert",
            self.refresh_tokens.create(record),
        )
        .await?;

        tracing::debug!(user_id = %user_id, token_id = %token_id, "Issued token pair");
        Ok(pair)
    }

    /// Exchange verified refresh claims for a new pair
    ///
    /// The successor is signed first, then the store consumes the old record
    /// and saves the successor in one atomic step. Of several concurrent
    /// calls with the same token exactly one succeeds, and a store failure
    /// leaves the old token usable. Replays revoke all of the user's refresh
    /// records.
    pub async fn rotate(&self, claims: &TokenClaims) -> Result<TokenPair, RotationError> {
        let token_id = claims.token_id().ok_or(RotationError::Unknown)?;
        let subject = claims.user_id().ok_or(RotationError::Unknown)?;

        let (pair, successor) = self.mint(subject)?;
        let successor_id = successor.token_id;

        let outcome = bounded(
            self.store_timeout,
            "refresh record rotate",
            self.refresh_tokens.rotate(token_id, successor, Utc::now()),
        )
        .await?;

        match outcome {
            ConsumeOutcome::Consumed { user_id } => {
                tracing::debug!(
                    user_id = %user_id,
                    token_id = %token_id,
                    successor_id = %successor_id,
                    "Rotated refresh token"
                );
                Ok(pair)
            }
            ConsumeOutcome::OwnerMismatch { user_id } => {
                tracing::error!(
                    token_id = %token_id,
                    record_user_id = %user_id,
                    claimed_user_id = %subject,
                    "Refresh token subject does not match its record"
                );
                Err(RotationError::SubjectMismatch)
            }
            ConsumeOutcome::AlreadyRevoked { user_id } => {
                let revoked = bounded(
                    self.store_timeout,
                    "refresh record revoke-all",
                    self.refresh_tokens.revoke_all_for_user(user_id),
                )
                .await?;
                tracing::error!(
                    user_id = %user_id,
                    token_id = %token_id,
                    revoked_sessions = revoked,
                    "Refresh token reuse detected; revoked all refresh tokens for user"
                );
                Err(RotationError::AlreadyRevoked { user_id })
            }
            ConsumeOutcome::Expired { user_id } => {
                tracing::info!(user_id = %user_id, token_id = %token_id, "Refresh token expired");
                Err(RotationError::Expired)
            }
            ConsumeOutcome::NotFound => {
                tracing::warn!(token_id = %token_id, "Refresh token has no record");
                Err(RotationError::Unknown)
            }
        }
    }

    /// Revoke the record behind a refresh token (logout). Idempotent.
    pub async fn revoke(&self, claims: &TokenClaims) -> Result<(), RotationError> {
        let token_id = claims.token_id().ok_or(RotationError::Unknown)?;

        let was_active = bounded(
            self.store_timeout,
            "refresh record revoke",
            self.refresh_tokens.revoke(token_id),
        )
        .await?;

        tracing::info!(token_id = %token_id, was_active, "Refresh token revoked");
        Ok(())
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{PasswordVerifier, TokenCodec, TokenIssuer};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::store::{CredentialStore, RefreshTokenStore};

/// Shared, request-independent state handed to every handler
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub codec: Arc<TokenCodec>,
    pub issuer: TokenIssuer,
    pub passwords: PasswordVerifier,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn build(
        settings: &Settings,
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, AppError> {
        let codec = Arc::new(TokenCodec::new(&settings.jwt));
        let store_timeout = settings.timeouts.store();
        let issuer = TokenIssuer::new(
            codec.clone(),
            refresh_tokens,
            settings.jwt.access_token_expiry,
            settings.jwt.refresh_token_expiry,
            store_timeout,
        );
        let passwords = PasswordVerifier::new(settings.password.bcrypt_cost, settings.timeouts.hashing())?;

        tracing::info!(
            key_id = codec.key_id(),
            issuer = codec.issuer(),
            "Token signing key loaded; tokens signed under any other key are rejected"
        );

        Ok(Self {
            credentials,
            codec,
            issuer,
            passwords,
            store_timeout,
        })
    }
}

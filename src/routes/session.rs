/// Session Routes
///
/// `login`, `check`, `refresh` and `logout`. Every rejection is returned as
/// an `AppError`, which logs it and renders the error envelope.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{BearerToken, TokenClaims, TokenError, TokenKind, TokenPair};
use crate::error::{AppError, AuthError, ValidationError};
use crate::routes::DataEnvelope;
use crate::state::AppState;
use crate::store::bounded;

const MAX_USERNAME_LENGTH: usize = 256;
const MAX_PASSWORD_LENGTH: usize = 128;

/// User login request
///
/// Absent fields deserialize as empty and are reported as missing.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Token pair response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl TokenPairResponse {
    fn new(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub subject: String,
    /// Unix seconds
    pub expires_at: i64,
}

/// Username is trimmed and otherwise matched exactly. The password is taken
/// verbatim but must contain something other than whitespace.
fn validate_credentials(body: &LoginRequest) -> Result<(&str, &str), ValidationError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ValidationError::EmptyField("username"));
    }
    if body.password.trim().is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username", MAX_USERNAME_LENGTH));
    }
    if body.password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }
    Ok((username, body.password.as_str()))
}

/// Decode a bearer token and insist on its kind
fn verify_token(
    state: &AppState,
    token: &BearerToken,
    expected: TokenKind,
    operation: &'static str,
) -> Result<TokenClaims, AuthError> {
    let claims = state.codec.decode(token.as_str()).map_err(|e| match e {
        TokenError::Expired => {
            tracing::info!(operation, "Expired token presented");
            AuthError::TokenExpired
        }
        TokenError::Malformed | TokenError::SignatureInvalid | TokenError::Encoding(_) => {
            tracing::warn!(operation, error = %e, "Rejected token; possible tampering");
            AuthError::TokenInvalid
        }
    })?;

    if claims.kind != expected {
        tracing::warn!(
            operation,
            presented = ?claims.kind,
            expected = ?expected,
            subject = %claims.sub,
            "Token of the wrong kind presented"
        );
        return Err(AuthError::TokenInvalid);
    }

    Ok(claims)
}

/// POST /login
///
/// Authenticate with username and password and receive a token pair.
///
/// # Errors
/// - 400: Body is not JSON, or a field is missing, blank, or too long
/// - 401: Unknown username or wrong password (identical responses)
/// - 405 / 415: Wrong method or content type (see `startup`)
/// - 500: Store or hashing failure
pub async fn login(
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (username, password) = validate_credentials(&body)?;

    let user = bounded(
        state.store_timeout,
        "credential lookup",
        state.credentials.find_by_username(username),
    )
    .await?;

    // Unknown users still pay for one bcrypt verification.
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let password_matches = state
        .passwords
        .verify(password.to_string(), stored_hash)
        .await?;

    let user = match user {
        Some(user) if password_matches => user,
        Some(_) => {
            tracing::warn!(username = %username, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        None => {
            tracing::warn!(username = %username, "Login failed: unknown username");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let pair = state.issuer.issue(user.user_id).await?;

    tracing::info!(user_id = %user.user_id, "User logged in successfully");

    Ok(HttpResponse::Ok().json(DataEnvelope::new(TokenPairResponse::new(
        pair,
        state.issuer.access_ttl(),
    ))))
}

/// GET|POST /check
///
/// Verify an access token.
/// **Requires** `Authorization: Bearer <access_token>`.
///
/// # Errors
/// - 401 `TOKEN_EXPIRED`: Token is correctly signed but past its expiry
/// - 401 `TOKEN_INVALID`: Missing, malformed, forged, or not an access token
pub async fn check(token: BearerToken, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let claims = verify_token(&state, &token, TokenKind::Access, "check")?;

    tracing::debug!(subject = %claims.sub, "Access token verified");

    Ok(HttpResponse::Ok().json(DataEnvelope::new(CheckResponse {
        subject: claims.sub,
        expires_at: claims.exp,
    })))
}

/// POST /refresh
///
/// Exchange a refresh token for a new pair. The presented token is consumed.
/// **Requires** `Authorization: Bearer <refresh_token>`.
///
/// # Errors
/// - 401 `TOKEN_EXPIRED`: Refresh token past its expiry
/// - 401 `TOKEN_INVALID`: Missing, malformed, forged, unknown, or an access token
/// - 401 `TOKEN_REUSED`: Token was already exchanged or logged out; every
///   refresh token of the user is revoked
/// - 500: Store failure
pub async fn refresh(token: BearerToken, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let claims = verify_token(&state, &token, TokenKind::Refresh, "refresh")?;

    let pair = state.issuer.rotate(&claims).await?;

    tracing::info!(user_id = %claims.sub, "Token refreshed successfully");

    Ok(HttpResponse::Ok().json(DataEnvelope::new(TokenPairResponse::new(
        pair,
        state.issuer.access_ttl(),
    ))))
}

/// POST /logout
///
/// Revoke the presented refresh token. Repeating the call is harmless.
/// **Requires** `Authorization: Bearer <refresh_token>`.
///
/// # Errors
/// - 401 `TOKEN_EXPIRED` / `TOKEN_INVALID`: as for `/refresh`
/// - 500: Store failure
pub async fn logout(token: BearerToken, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let claims = verify_token(&state, &token, TokenKind::Refresh, "logout")?;

    state.issuer.revoke(&claims).await?;

    tracing::info!(user_id = %claims.sub, "User logged out");

    Ok(HttpResponse::NoContent().finish())
}

/// Fallback for a known path hit with an unsupported method
pub fn method_not_allowed(allow: &'static str) -> impl Fn() -> std::future::Ready<Result<HttpResponse, AppError>> + Clone {
    move || std::future::ready(Err(AppError::MethodNotAllowed { allow }))
}

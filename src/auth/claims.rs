/// Token claims
///
/// The payload carried inside every signed token. Timestamps are Unix
/// seconds, as in RFC 7519.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    pub iss: String,
    pub kind: TokenKind,
    /// Refresh record id; refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    pub fn access(user_id: Uuid, issued_at: i64, ttl_seconds: i64, issuer: &str) -> Self {
        Self {
            sub: user_id.to_string(),
            iat: issued_at,
            exp: issued_at + ttl_seconds,
            iss: issuer.to_string(),
            kind: TokenKind::Access,
            jti: None,
        }
    }

    pub fn refresh(
        user_id: Uuid,
        token_id: Uuid,
        issued_at: i64,
        ttl_seconds: i64,
        issuer: &str,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            iat: issued_at,
            exp: issued_at + ttl_seconds,
            iss: issuer.to_string(),
            kind: TokenKind::Refresh,
            jti: Some(token_id.to_string()),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Refresh record id, if this is a well-formed refresh token
    pub fn token_id(&self) -> Option<Uuid> {
        match self.kind {
            TokenKind::Refresh => self.jti.as_deref().and_then(|id| Uuid::parse_str(id).ok()),
            TokenKind::Access => None,
        }
    }
}

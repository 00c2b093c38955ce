/// Bearer token extractor
///
/// Pulls the token out of `Authorization: Bearer <token>`. A missing or
/// differently-schemed header rejects the request with `TOKEN_INVALID`
/// before the handler runs.

use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::{AppError, AuthError};

// Auth schemes are case-insensitive (RFC 7235)
const BEARER_SCHEME: &str = "bearer";

pub struct BearerToken(String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn extract(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl FromRequest for BearerToken {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract(req).map(BearerToken).ok_or_else(|| {
            tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
            AppError::Auth(AuthError::MissingToken)
        }))
    }
}

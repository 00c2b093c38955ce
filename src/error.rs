/// Error Handling Module
///
/// Every failure the service can produce folds into `AppError`, which
/// renders the response envelope:
///
/// ```json
/// { "error": { "code": 401, "reason": "TOKEN_EXPIRED", "errors": [{ "message": "token expired" }] } }
/// ```
///
/// Client input errors carry a safe message. Authentication errors carry a
/// deliberately generic message plus a machine-readable `reason`. Internal
/// errors are logged in full and answered with "internal server error".

use actix_web::{
    error::{JsonPayloadError, ResponseError},
    http::{header, StatusCode},
    HttpRequest, HttpResponse,
};
use serde::Serialize;

use crate::auth::RotationError;
use crate::store::StoreError;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Client input errors, safe to echo back
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid json")]
    InvalidJson,
    #[error("{0} is required")]
    EmptyField(&'static str),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
}

/// Authentication failures, all answered with 401
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token reused")]
    TokenReused,
}

impl AuthError {
    /// Machine-readable code placed in `error.reason`
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingToken | AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenReused => "TOKEN_REUSED",
        }
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("method not allowed")]
    MethodNotAllowed { allow: &'static str },
    #[error("unsupported content type")]
    UnsupportedMediaType,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RotationError> for AppError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::AlreadyRevoked { .. } => AppError::Auth(AuthError::TokenReused),
            RotationError::Expired => AppError::Auth(AuthError::TokenExpired),
            RotationError::Unknown | RotationError::SubjectMismatch => {
                AppError::Auth(AuthError::TokenInvalid)
            }
            RotationError::Store(e) => AppError::Store(e),
            RotationError::Token(e) => AppError::Internal(e.to_string()),
        }
    }
}

// ============================================================================
// 3. RESPONSE ENVELOPE
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// HTTP status code
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub errors: Vec<ErrorMessage>,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, reason: Option<&'static str>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: status.as_u16(),
                reason,
                errors: vec![ErrorMessage {
                    message: message.into(),
                }],
            },
        }
    }
}

impl AppError {
    /// Status, reason, and the message the client is allowed to see
    fn public_parts(&self) -> (StatusCode, Option<&'static str>, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, None, e.to_string()),
            AppError::MethodNotAllowed { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, None, "invalid method".to_string())
            }
            AppError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                None,
                "invalid content type".to_string(),
            ),
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, Some(e.reason()), e.to_string()),
            AppError::Store(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                "internal server error".to_string(),
            ),
        }
    }

    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Rejected request input");
            }
            AppError::MethodNotAllowed { .. } | AppError::UnsupportedMediaType => {
                tracing::warn!(error_id = error_id, error = %self, "Rejected request");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, reason = e.reason(), "Authentication rejected");
            }
            AppError::Store(e) => {
                tracing::error!(error_id = error_id, error = %e, "Store failure");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.public_parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let (status, reason, message) = self.public_parts();
        let mut response = HttpResponse::build(status);
        response.insert_header(("x-error-id", error_id));
        if let AppError::MethodNotAllowed { allow } = self {
            response.insert_header((header::ALLOW, *allow));
        }
        response.json(ErrorEnvelope::new(status, reason, message))
    }
}

// ============================================================================
// 4. EXTRACTOR ERROR MAPPING
// ============================================================================

/// `JsonConfig` error handler: a wrong content type is a 415, anything else
/// the JSON extractor trips over is a 400.
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let app_error = match err {
        JsonPayloadError::ContentType => AppError::UnsupportedMediaType,
        other => {
            tracing::debug!(path = %req.path(), error = %other, "Unparseable JSON body");
            AppError::Validation(ValidationError::InvalidJson)
        }
    };
    app_error.into()
}

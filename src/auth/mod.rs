/// Authentication module
///
/// Password verification, token signing and verification, and refresh
/// token issuance/rotation.

mod bearer;
mod claims;
mod issuer;
mod jwt;
mod password;

pub use bearer::BearerToken;
pub use claims::{TokenClaims, TokenKind};
pub use issuer::{RotationError, TokenIssuer, TokenPair};
pub use jwt::{TokenCodec, TokenError};
pub use password::{hash_password, verify_password, PasswordVerifier};

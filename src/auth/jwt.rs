/// Token Codec
///
/// Signs and verifies HS256 JWTs. Decoding reports *why* a token was
/// rejected, because handlers answer an expired token differently from a
/// forged one.
///
/// The header `kid` is a short fingerprint of the signing key. Tokens signed
/// under a previous key are rejected as `SignatureInvalid`: rotating the key
/// logs every client out.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};

use crate::auth::claims::TokenClaims;
use crate::configuration::JwtSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    SignatureInvalid,
    #[error("token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    key_id: String,
    issuer: String,
    leeway: i64,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        let secret = config.secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = config.clock_skew_seconds;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            key_id: key_fingerprint(secret),
            issuer: config.issuer.clone(),
            leeway: config.clock_skew_seconds as i64,
        }
    }

    /// Fingerprint of the signing key, safe to log
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a claim set
    ///
    /// # Errors
    /// Only fails if the claims cannot be serialized, which is a programming
    /// error rather than a client one.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.key_id.clone());

        encode(&header, claims, &self.encoding_key).map_err(TokenError::Encoding)
    }

    /// Verify signature, structure and expiry, in that order
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.kid.as_deref() != Some(self.key_id.as_str()) {
            return Err(TokenError::SignatureInvalid);
        }

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidIssuer => {
                    TokenError::SignatureInvalid
                }
                _ => TokenError::Malformed,
            })?;

        let now = chrono::Utc::now().timestamp();
        if claims.iat > now + self.leeway || claims.iat > claims.exp {
            return Err(TokenError::Malformed);
        }

        Ok(claims)
    }
}

fn key_fingerprint(secret: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Password Hashing and Verification
///
/// bcrypt, with its built-in salt and constant-time comparison. Verification
/// fails closed: a stored hash bcrypt cannot parse counts as a mismatch.

use bcrypt::{hash, verify};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::time::Duration;

use crate::error::AppError;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if bcrypt rejects the cost or fails internally
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// Never errors: a malformed hash is logged and treated as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}

/// Runs verifications off the async executor, with a deadline.
///
/// Holds a hash of a random throwaway password at the configured cost, so a
/// login for an unknown user spends the same bcrypt work as one for a known
/// user.
#[derive(Clone)]
pub struct PasswordVerifier {
    dummy_hash: String,
    timeout: Duration,
}

impl PasswordVerifier {
    pub fn new(cost: u32, timeout: Duration) -> Result<Self, AppError> {
        let throwaway: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        Ok(Self {
            dummy_hash: hash_password(&throwaway, cost)?,
            timeout,
        })
    }

    /// Check `password` against `stored_hash`, or against the dummy hash
    /// when there is no such user. The latter always yields `false`.
    ///
    /// # Errors
    /// Returns an internal error if the blocking task panics or overruns the
    /// deadline.
    pub async fn verify(&self, password: String, stored_hash: Option<String>) -> Result<bool, AppError> {
        let dummy_hash = self.dummy_hash.clone();
        let task = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => verify_password(&password, &hash),
            None => {
                verify_password(&password, &dummy_hash);
                false
            }
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(matches)) => Ok(matches),
            Ok(Err(e)) => Err(AppError::Internal(format!("Password verification task failed: {}", e))),
            Err(_) => Err(AppError::Internal("Password verification timed out".to_string())),
        }
    }
}

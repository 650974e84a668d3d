/// Password hashing and verification
///
/// bcrypt with the default cost, so verification stays deliberately slow.
/// Hashing is CPU-bound; request handlers must go through the `_blocking`
/// wrappers, which dispatch to tokio's bounded blocking pool so a burst of
/// logins cannot starve I/O-bound request handling.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::{AppError, AuthError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    /// Cost-equivalent hash verified against when a login targets an unknown
    /// email, so that path takes as long as a real password mismatch.
    static ref DUMMY_HASH: String =
        hash("timing-equalization-placeholder", DEFAULT_COST).expect("bcrypt self-hash failed");
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns `WeakPassword` if the password fails the strength policy, or an
/// internal error if bcrypt itself fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Async wrapper around [`hash_password`] that runs on the blocking pool.
pub async fn hash_password_blocking(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

/// Async wrapper around [`verify_password`] that runs on the blocking pool.
pub async fn verify_password_blocking(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

/// Burn one bcrypt verification without learning anything.
///
/// Called when the presented email matches no user, so the failure is
/// indistinguishable in timing from a wrong password.
pub async fn equalize_verification_timing(password: &str) {
    let _ = verify_password_blocking(password, &DUMMY_HASH).await;
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Auth(AuthError::WeakPassword(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ))));
    }

    // bcrypt limitation and oversized-input protection
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Auth(AuthError::WeakPassword(format!(
            "password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        ))));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Auth(AuthError::WeakPassword(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

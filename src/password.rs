//! Password hashing and verification.
//!
//! Argon2id with per-password random salts, PHC string output. Pure functions
//! over their inputs; no I/O and no shared state.

use crate::error::{AuthError, AuthResult};
use anyhow::anyhow;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// Minimum accepted password length, enforced at registration and update.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Upper bound on password input, far below the primitive's own limit but
/// enough to stop pathological inputs from reaching the KDF.
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Hash a password into a PHC-format string with a fresh random salt.
///
/// # Errors
/// Returns [`AuthError::Internal`] if the input exceeds [`MAX_PASSWORD_LENGTH`]
/// or the underlying primitive rejects it.
pub fn hash(password: &str) -> AuthResult<String> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::Internal(anyhow!(
            "password exceeds {MAX_PASSWORD_LENGTH} bytes"
        )));
    }
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|err| AuthError::Internal(anyhow!("salt generation failed: {err}")))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|err| AuthError::Internal(anyhow!("salt encoding failed: {err}")))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AuthError::Internal(anyhow!("password hashing failed: {err}")))?
        .to_string();
    Ok(phc)
}

/// Verify a password against a stored PHC hash.
///
/// The comparison is constant-time over the derived digest; timing does not
/// correlate with how much of the hash matches. A malformed stored hash
/// verifies as `false` rather than erroring, so the caller's failure mode
/// stays the single generic "invalid credentials".
#[must_use]
pub fn verify(stored_hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(stored_hash) {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    } else {
        false
    }
}

/// Check password shape before hashing.
///
/// # Errors
/// Returns [`AuthError::InvalidInput`] naming the bound that failed.
pub fn validate(password: &str) -> AuthResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidInput(
            "password must be at least 8 characters",
        ));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::InvalidInput("password is too long"));
    }
    Ok(())
}

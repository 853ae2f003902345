//! Error taxonomy for the session and identity core.
//!
//! Verification-layer failures are generic by design: callers must not be able
//! to tell an unknown email from a wrong password, or a rotated refresh token
//! from an expired one. Store and codec failures carry context internally and
//! surface as [`AuthError::Internal`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials or a bad/expired/reused refresh token. The message is
    /// deliberately coarse; the cause is never distinguishable to the caller.
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Duplicate email during registration, or a federated identity colliding
    /// with an existing local account.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Registration input rejected before any store call: malformed email,
    /// out-of-bounds password.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Lookup miss by ID. Internal use only; the lifecycle manager wraps this
    /// into [`AuthError::Internal`] before it can reach an external caller,
    /// since a missing principal behind an otherwise-valid handle means the
    /// store is inconsistent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Hashing, signing, or store I/O failure.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// The single error value returned for every failed login.
    #[must_use]
    pub const fn invalid_credentials() -> Self {
        Self::Unauthenticated("invalid credentials")
    }

    /// The single error value returned for every failed refresh.
    #[must_use]
    pub const fn invalid_refresh_token() -> Self {
        Self::Unauthenticated("invalid or expired refresh token")
    }

    /// Returned when the old password presented to a password update does not
    /// verify. Intentionally silent about which check failed.
    #[must_use]
    pub const fn incorrect_old_password() -> Self {
        Self::Unauthenticated("incorrect old password")
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn login_failures_share_one_message() {
        // Unknown email and wrong password must be indistinguishable.
        let a = AuthError::invalid_credentials().to_string();
        let b = AuthError::invalid_credentials().to_string();
        assert_eq!(a, b);
        assert_eq!(a, "invalid credentials");
    }

    #[test]
    fn internal_hides_the_underlying_cause() {
        let err = AuthError::from(anyhow!("connection reset by peer"));
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn conflict_carries_context() {
        let err = AuthError::Conflict("email already registered".to_string());
        assert_eq!(err.to_string(), "conflict: email already registered");
    }
}

//! Store contracts the session core depends on, plus the records they persist.
//!
//! The core consumes these traits and never implements business logic inside
//! them; see [`postgres`](super::postgres) and [`memory`](super::memory) for
//! the bundled adapters.

use crate::error::{AuthError, AuthResult};
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A verified local user. Owned by the user store; the core only reads it and
/// requests password-hash updates.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// `None` for federated-only accounts, which have no local password.
    pub password_hash: Option<String>,
    pub role: Role,
}

/// Fields required to create a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// Generate a new opaque refresh token: 32 random bytes, base64url, unpadded.
/// The raw value is only ever returned to the caller; stores persist a hash.
///
/// # Errors
/// Returns [`AuthError::Internal`] if the system RNG fails.
pub fn generate_refresh_token() -> AuthResult<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")
        .map_err(AuthError::Internal)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a refresh token so raw values never touch storage. The hash is what
/// adapters index and compare on.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> AuthResult<Option<Principal>>;

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>>;

    /// Create a principal. The email (and username) uniqueness check must be
    /// atomic with the insert; a duplicate maps to [`AuthError::Conflict`].
    async fn create(&self, new_principal: NewPrincipal) -> AuthResult<Uuid>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new active refresh token record.
    async fn store(
        &self,
        principal_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Atomically check-and-consume: flip the record inactive and return the
    /// owning principal only if it was active and unexpired.
    ///
    /// Adapter precondition: this must be a single atomic step (a conditional
    /// update, or its equivalent under one lock). When two callers race on the
    /// same token, at most one may observe it active; the other gets `None`.
    /// Not-found, expired, and already-consumed are all `None` — deliberately
    /// indistinguishable.
    async fn validate_and_resolve(&self, token: &str) -> AuthResult<Option<Uuid>>;

    /// Flip a record inactive. Idempotent: unknown or already-inactive tokens
    /// succeed as a no-op.
    async fn invalidate(&self, token: &str) -> AuthResult<()>;

    /// Flip every active record owned by the principal to inactive.
    async fn invalidate_all(&self, principal_id: Uuid) -> AuthResult<()>;
}

#[async_trait]
pub trait IdentityLinkStore: Send + Sync {
    async fn find_principal(&self, provider: &str, external_id: &str)
        -> AuthResult<Option<Uuid>>;

    /// Record a `(provider, external_id) -> principal` link. Links are created
    /// once and never mutated; a duplicate maps to [`AuthError::Conflict`].
    async fn create_link(
        &self,
        principal_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn refresh_tokens_decode_to_32_bytes() {
        let decoded_len = generate_refresh_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn refresh_tokens_are_unique() {
        let first = generate_refresh_token().expect("token");
        let second = generate_refresh_token().expect("token");
        assert_ne!(first, second);
    }

    #[test]
    fn hash_refresh_token_stable() {
        let first = hash_refresh_token("token");
        let second = hash_refresh_token("token");
        let different = hash_refresh_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!(Role::from_str("user"), Ok(Role::User));
        assert_eq!(Role::from_str("admin"), Ok(Role::Admin));
        assert_eq!(Role::User.as_str(), "user");
        assert!(Role::from_str("root").is_err());
    }
}

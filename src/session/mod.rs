//! Session lifecycle orchestration.
//!
//! The manager owns the invariants: generic credential failures, single-use
//! rotating refresh tokens, and cascading revocation on security-relevant
//! events. It is stateless — all mutable state lives behind the store traits —
//! so its methods are safe to call concurrently without internal locking. No
//! method retries or spawns background work; a failed store call surfaces
//! immediately, and cancellation is cooperative — dropping a call's future
//! cancels its in-flight store I/O.
//!
//! A refresh token record moves `Active -> Inactive` through rotation,
//! explicit logout, or bulk revocation, and becomes effectively invalid once
//! expired. There is no transition out of `Inactive`, and a token value is
//! never reused or re-activated.

pub mod memory;
pub mod postgres;
pub mod store;

use anyhow::anyhow;
use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::password;
use crate::token::{Claims, TokenCodec};
use self::store::{
    NewPrincipal, Principal, RefreshTokenStore, Role, UserStore, generate_refresh_token,
};

/// The two credentials returned by a successful login or refresh.
#[derive(Debug)]
pub struct TokenPair {
    /// Short-lived, stateless, signed access token.
    pub access_token: String,
    /// Long-lived, revocable, opaque refresh token.
    pub refresh_token: String,
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
    refresh_ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let refresh_ttl = Duration::from_std(config.refresh_token_ttl())
            .unwrap_or_else(|_| Duration::days(7));
        Self {
            users,
            refresh_tokens,
            codec: TokenCodec::new(config),
            refresh_ttl,
        }
    }

    /// Create a local account with a password.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a malformed email or out-of-bounds
    /// password, [`AuthError::Conflict`] when the email or username is taken.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password_input: &str,
    ) -> AuthResult<Principal> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("malformed email address"));
        }
        password::validate(password_input)?;
        let password_hash = password::hash(password_input)?;

        let id = self
            .users
            .create(NewPrincipal {
                username: username.to_string(),
                email: email.clone(),
                password_hash: Some(password_hash.clone()),
                role: Role::User,
            })
            .await?;

        Ok(Principal {
            id,
            username: username.to_string(),
            email,
            password_hash: Some(password_hash),
            role: Role::User,
        })
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown email, password-less (federated-only) account, and wrong
    /// password all return the identical generic error; callers cannot probe
    /// which accounts exist.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] on any credential failure,
    /// [`AuthError::Internal`] if minting or persistence fails — in which case
    /// the caller receives no tokens.
    pub async fn login(&self, email: &str, password_input: &str) -> AuthResult<TokenPair> {
        let email = normalize_email(email);
        let Some(principal) = self.users.get_by_email(&email).await? else {
            return Err(AuthError::invalid_credentials());
        };
        let verified = principal
            .password_hash
            .as_deref()
            .is_some_and(|hash| password::verify(hash, password_input));
        if !verified {
            return Err(AuthError::invalid_credentials());
        }

        self.issue_pair(&principal).await
    }

    /// Rotate a refresh token: consume the presented one, issue a new pair.
    ///
    /// Not-found, expired, and already-rotated tokens collapse into one
    /// generic error; session state is not observable through failures.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] when the token does not resolve,
    /// [`AuthError::Internal`] on store/codec failure or when a consumed token
    /// points at a principal that no longer exists.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let Some(principal_id) = self
            .refresh_tokens
            .validate_and_resolve(refresh_token)
            .await?
        else {
            return Err(AuthError::invalid_refresh_token());
        };

        let Some(principal) = self.users.get_by_id(principal_id).await? else {
            error!(%principal_id, "consumed refresh token resolves to a missing principal");
            return Err(AuthError::Internal(anyhow!(
                "principal record missing for a consumed refresh token"
            )));
        };

        let pair = self.issue_pair(&principal).await?;

        // The consume above already retired the old token; this explicit flip
        // covers adapters whose validate step is read-only. It runs only after
        // the new pair is durably stored, and if it fails the old token
        // lingers until expiry — logged, non-fatal.
        if let Err(err) = self.refresh_tokens.invalidate(refresh_token).await {
            warn!(%principal_id, "failed to invalidate rotated refresh token: {err}");
        }

        Ok(pair)
    }

    /// Close the session held by a refresh token.
    ///
    /// Idempotent, and always reports success: unknown and already-inactive
    /// tokens are indistinguishable from live ones, and a store failure is
    /// logged rather than surfaced.
    ///
    /// # Errors
    /// None in practice; the `Result` keeps the surface uniform.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        if let Err(err) = self.refresh_tokens.invalidate(refresh_token).await {
            warn!("failed to invalidate refresh token on logout: {err}");
        }
        Ok(())
    }

    /// Change a principal's password and revoke every session it owns.
    ///
    /// The credential update is the primary effect; if the bulk revocation
    /// fails afterwards the operation still reports success and the failure
    /// is logged.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] when the old password does not verify
    /// (including password-less federated accounts — the cause is not
    /// distinguishable), [`AuthError::InvalidInput`] for an out-of-bounds new
    /// password, [`AuthError::Internal`] on hash/store failure or a missing
    /// principal.
    pub async fn update_password(
        &self,
        principal_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let Some(principal) = self.users.get_by_id(principal_id).await? else {
            error!(%principal_id, "password update requested for a missing principal");
            return Err(AuthError::Internal(anyhow!(
                "principal record missing for password update"
            )));
        };

        let verified = principal
            .password_hash
            .as_deref()
            .is_some_and(|hash| password::verify(hash, old_password));
        if !verified {
            return Err(AuthError::incorrect_old_password());
        }

        password::validate(new_password)?;
        let new_hash = password::hash(new_password)?;
        self.users
            .update_password_hash(principal_id, &new_hash)
            .await
            .map_err(internalize_not_found)?;

        if let Err(err) = self.refresh_tokens.invalidate_all(principal_id).await {
            warn!(%principal_id, "password updated but session revocation failed: {err}");
        }

        Ok(())
    }

    /// Revoke every session a principal owns ("log out of all devices").
    ///
    /// Unlike the revocation step inside [`Self::update_password`], a store
    /// failure here is surfaced: nothing more important has already happened.
    ///
    /// # Errors
    /// [`AuthError::Internal`] on store failure.
    pub async fn invalidate_all_sessions(&self, principal_id: Uuid) -> AuthResult<()> {
        self.refresh_tokens.invalidate_all(principal_id).await
    }

    /// Validate an access token and return its claims.
    ///
    /// Expiry, signature, and claim mismatches are logged distinctly but all
    /// collapse to one generic error for the caller.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] for any rejected token.
    pub fn validate_access_token(&self, token: &str) -> AuthResult<Claims> {
        self.codec.validate(token).map_err(|err| {
            debug!("access token rejected: {err}");
            AuthError::Unauthenticated("invalid access token")
        })
    }

    async fn issue_pair(&self, principal: &Principal) -> AuthResult<TokenPair> {
        let access_token = self
            .codec
            .mint(principal.id, &principal.username, &principal.email)?;
        let refresh_token = generate_refresh_token()?;
        let expires_at = Utc::now() + self.refresh_ttl;
        self.refresh_tokens
            .store(principal.id, &refresh_token, expires_at)
            .await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

/// A store-level `NotFound` crossing the manager boundary means the data is
/// inconsistent, not that the caller asked for something missing.
fn internalize_not_found(err: AuthError) -> AuthError {
    match err {
        AuthError::NotFound(what) => {
            AuthError::Internal(anyhow!("store record vanished mid-operation: {what}"))
        }
        other => other,
    }
}

//! Federated identity linking.
//!
//! Resolves an already-verified external identity to a local principal, or
//! creates one. This is not an OAuth/OIDC flow: by the time this module is
//! called, some other layer has finished proving who the external user is.

use anyhow::anyhow;
use std::sync::Arc;
use tracing::warn;

use crate::error::{AuthError, AuthResult};
use crate::session::store::{IdentityLinkStore, NewPrincipal, Principal, Role, UserStore};
use crate::session::{normalize_email, valid_email};

pub struct IdentityLinker {
    users: Arc<dyn UserStore>,
    links: Arc<dyn IdentityLinkStore>,
}

impl IdentityLinker {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, links: Arc<dyn IdentityLinkStore>) -> Self {
        Self { users, links }
    }

    /// Resolve `(provider, external_id)` to a principal, creating a
    /// password-less account and the link on first sight.
    ///
    /// The check-then-create sequence rides on the stores' unique constraints:
    /// whichever racing caller loses the insert sees a conflict, and a lost
    /// link race is answered by returning the winner's principal. A link is
    /// written once and never mutated.
    ///
    /// # Errors
    /// [`AuthError::Conflict`] when the email already belongs to an unlinked
    /// local account — a federated identity must not take over an existing
    /// one. [`AuthError::InvalidInput`] for a malformed email.
    /// [`AuthError::Internal`] on store failure or when an existing link
    /// points at a principal that no longer exists.
    pub async fn link_or_create(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
        display_name: &str,
    ) -> AuthResult<Principal> {
        if let Some(principal_id) = self.links.find_principal(provider, external_id).await? {
            let Some(principal) = self.users.get_by_id(principal_id).await? else {
                return Err(AuthError::Internal(anyhow!(
                    "identity link {provider}/{external_id} points at missing principal {principal_id}"
                )));
            };
            return Ok(principal);
        }

        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("malformed email address"));
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict(format!(
                "email {email} already belongs to another account"
            )));
        }

        // Federated-only accounts carry no local password.
        let id = self
            .users
            .create(NewPrincipal {
                username: display_name.to_string(),
                email: email.clone(),
                password_hash: None,
                role: Role::User,
            })
            .await?;

        match self.links.create_link(id, provider, external_id).await {
            Ok(()) => {}
            Err(AuthError::Conflict(_)) => {
                // Lost the link race: another caller created the link between
                // our lookup and insert. Return their principal.
                warn!(provider, external_id, "identity link created concurrently");
                if let Some(winner_id) = self.links.find_principal(provider, external_id).await? {
                    let Some(principal) = self.users.get_by_id(winner_id).await? else {
                        return Err(AuthError::Internal(anyhow!(
                            "identity link {provider}/{external_id} points at missing principal {winner_id}"
                        )));
                    };
                    return Ok(principal);
                }
                return Err(AuthError::Internal(anyhow!(
                    "identity link {provider}/{external_id} vanished after conflict"
                )));
            }
            Err(err) => return Err(err),
        }

        let Some(principal) = self.users.get_by_id(id).await? else {
            return Err(AuthError::Internal(anyhow!(
                "principal {id} missing immediately after creation"
            )));
        };
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{InMemoryIdentityLinkStore, InMemoryUserStore};

    fn linker() -> (IdentityLinker, Arc<InMemoryUserStore>) {
        let users = Arc::new(InMemoryUserStore::new());
        let links = Arc::new(InMemoryIdentityLinkStore::new());
        (
            IdentityLinker::new(Arc::clone(&users) as _, links),
            users,
        )
    }

    #[tokio::test]
    async fn first_sight_creates_a_passwordless_principal() {
        let (linker, _) = linker();
        let principal = linker
            .link_or_create("google", "ext-1", "bob@example.test", "bob")
            .await
            .expect("create");
        assert_eq!(principal.email, "bob@example.test");
        assert_eq!(principal.password_hash, None);
        assert_eq!(principal.role, Role::User);
    }

    #[tokio::test]
    async fn repeat_logins_resolve_to_the_same_principal() {
        let (linker, _) = linker();
        let first = linker
            .link_or_create("google", "ext-1", "bob@example.test", "bob")
            .await
            .expect("create");
        // Email and display name may drift at the provider; the link decides.
        let second = linker
            .link_or_create("google", "ext-1", "changed@example.test", "robert")
            .await
            .expect("lookup");
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn same_email_under_a_different_external_id_conflicts() {
        let (linker, _) = linker();
        linker
            .link_or_create("google", "ext-1", "bob@example.test", "bob")
            .await
            .expect("create");
        let err = linker
            .link_or_create("google", "ext-2", "bob@example.test", "bobby")
            .await
            .expect_err("email taken");
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn local_account_email_cannot_be_taken_over() {
        let (linker, users) = linker();
        users
            .create(NewPrincipal {
                username: "alice".to_string(),
                email: "alice@example.test".to_string(),
                password_hash: Some("$argon2id$fake".to_string()),
                role: Role::User,
            })
            .await
            .expect("local account");

        let err = linker
            .link_or_create("google", "ext-9", "alice@example.test", "alice-g")
            .await
            .expect_err("takeover blocked");
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn malformed_provider_email_is_rejected() {
        let (linker, _) = linker();
        let err = linker
            .link_or_create("google", "ext-1", "not-an-email", "bob")
            .await
            .expect_err("bad email");
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }
}

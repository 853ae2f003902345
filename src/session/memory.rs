//! In-memory store adapters.
//!
//! Back the full lifecycle without a database: tests, examples, and embedders
//! that keep sessions process-local. Each store guards its map with a single
//! lock, which is what makes the check-and-consume step atomic here.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{
    IdentityLinkStore, NewPrincipal, Principal, RefreshTokenStore, UserStore, hash_refresh_token,
};

#[derive(Default)]
pub struct InMemoryUserStore {
    principals: Mutex<HashMap<Uuid, Principal>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_email(&self, email: &str) -> AuthResult<Option<Principal>> {
        let principals = self.principals.lock().await;
        Ok(principals
            .values()
            .find(|principal| principal.email == email)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        let principals = self.principals.lock().await;
        Ok(principals.get(&id).cloned())
    }

    async fn create(&self, new_principal: NewPrincipal) -> AuthResult<Uuid> {
        // One lock spans the uniqueness check and the insert.
        let mut principals = self.principals.lock().await;
        if principals
            .values()
            .any(|existing| existing.email == new_principal.email)
        {
            return Err(AuthError::Conflict(format!(
                "email {} already registered",
                new_principal.email
            )));
        }
        if principals
            .values()
            .any(|existing| existing.username == new_principal.username)
        {
            return Err(AuthError::Conflict(format!(
                "username {} already taken",
                new_principal.username
            )));
        }
        let id = Uuid::new_v4();
        principals.insert(
            id,
            Principal {
                id,
                username: new_principal.username,
                email: new_principal.email,
                password_hash: new_principal.password_hash,
                role: new_principal.role,
            },
        );
        Ok(id)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<()> {
        let mut principals = self.principals.lock().await;
        match principals.get_mut(&id) {
            Some(principal) => {
                principal.password_hash = Some(password_hash.to_string());
                Ok(())
            }
            None => Err(AuthError::NotFound(format!("principal {id}"))),
        }
    }
}

struct RefreshRecord {
    principal_id: Uuid,
    expires_at: DateTime<Utc>,
    active: bool,
}

/// Refresh records keyed by token hash; raw values are never stored.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<Vec<u8>, RefreshRecord>>,
}

impl InMemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an active, unexpired record exists for the token. Test helper;
    /// the lifecycle itself only consumes through `validate_and_resolve`.
    pub async fn is_active(&self, token: &str) -> bool {
        let records = self.records.lock().await;
        records
            .get(&hash_refresh_token(token))
            .is_some_and(|record| record.active && record.expires_at > Utc::now())
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(
        &self,
        principal_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut records = self.records.lock().await;
        records.insert(
            hash_refresh_token(token),
            RefreshRecord {
                principal_id,
                expires_at,
                active: true,
            },
        );
        Ok(())
    }

    async fn validate_and_resolve(&self, token: &str) -> AuthResult<Option<Uuid>> {
        // Check and consume under one lock: of two racing callers, exactly one
        // sees the record active.
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&hash_refresh_token(token)) else {
            return Ok(None);
        };
        if !record.active || record.expires_at <= Utc::now() {
            return Ok(None);
        }
        record.active = false;
        Ok(Some(record.principal_id))
    }

    async fn invalidate(&self, token: &str) -> AuthResult<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&hash_refresh_token(token)) {
            record.active = false;
        }
        Ok(())
    }

    async fn invalidate_all(&self, principal_id: Uuid) -> AuthResult<()> {
        let mut records = self.records.lock().await;
        for record in records.values_mut() {
            if record.principal_id == principal_id {
                record.active = false;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdentityLinkStore {
    links: Mutex<HashMap<(String, String), Uuid>>,
}

impl InMemoryIdentityLinkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityLinkStore for InMemoryIdentityLinkStore {
    async fn find_principal(
        &self,
        provider: &str,
        external_id: &str,
    ) -> AuthResult<Option<Uuid>> {
        let links = self.links.lock().await;
        Ok(links
            .get(&(provider.to_string(), external_id.to_string()))
            .copied())
    }

    async fn create_link(
        &self,
        principal_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> AuthResult<()> {
        let mut links = self.links.lock().await;
        let key = (provider.to_string(), external_id.to_string());
        if links.contains_key(&key) {
            return Err(AuthError::Conflict(format!(
                "identity link {provider}/{external_id} already exists"
            )));
        }
        links.insert(key, principal_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::Role;
    use chrono::Duration;

    fn new_principal(username: &str, email: &str) -> NewPrincipal {
        NewPrincipal {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some("$argon2id$fake".to_string()),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn user_store_enforces_unique_email() {
        let store = InMemoryUserStore::new();
        store
            .create(new_principal("alice", "alice@example.test"))
            .await
            .expect("first create");
        let err = store
            .create(new_principal("alice2", "alice@example.test"))
            .await
            .expect_err("duplicate email");
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let store = InMemoryRefreshTokenStore::new();
        let principal_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);
        store
            .store(principal_id, "tok", expires)
            .await
            .expect("store");

        assert_eq!(
            store.validate_and_resolve("tok").await.expect("resolve"),
            Some(principal_id)
        );
        // Second consume observes the record inactive.
        assert_eq!(store.validate_and_resolve("tok").await.expect("resolve"), None);
    }

    #[tokio::test]
    async fn expired_records_resolve_to_none() {
        let store = InMemoryRefreshTokenStore::new();
        let expires = Utc::now() - Duration::seconds(1);
        store
            .store(Uuid::new_v4(), "tok", expires)
            .await
            .expect("store");
        assert_eq!(store.validate_and_resolve("tok").await.expect("resolve"), None);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let store = InMemoryRefreshTokenStore::new();
        store.invalidate("never-issued").await.expect("no-op");
        store
            .store(Uuid::new_v4(), "tok", Utc::now() + Duration::hours(1))
            .await
            .expect("store");
        store.invalidate("tok").await.expect("first");
        store.invalidate("tok").await.expect("second");
        assert!(!store.is_active("tok").await);
    }

    #[tokio::test]
    async fn invalidate_all_only_touches_one_principal() {
        let store = InMemoryRefreshTokenStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);
        store.store(alice, "a1", expires).await.expect("store");
        store.store(alice, "a2", expires).await.expect("store");
        store.store(bob, "b1", expires).await.expect("store");

        store.invalidate_all(alice).await.expect("bulk");
        assert!(!store.is_active("a1").await);
        assert!(!store.is_active("a2").await);
        assert!(store.is_active("b1").await);
    }

    #[tokio::test]
    async fn link_store_rejects_duplicate_links() {
        let store = InMemoryIdentityLinkStore::new();
        let principal_id = Uuid::new_v4();
        store
            .create_link(principal_id, "google", "ext-1")
            .await
            .expect("create");
        assert_eq!(
            store.find_principal("google", "ext-1").await.expect("find"),
            Some(principal_id)
        );
        let err = store
            .create_link(Uuid::new_v4(), "google", "ext-1")
            .await
            .expect_err("duplicate");
        assert!(matches!(err, AuthError::Conflict(_)));
    }
}

//! Postgres store adapters.
//!
//! Runtime sqlx queries over the schema in `sql/schema.sql`. Expiry checks run
//! server-side against `NOW()`, and the check-and-consume step is a single
//! conditional `UPDATE`, which is what makes it atomic under concurrent
//! refresh attempts on the same token.

use crate::error::{AuthError, AuthResult};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::store::{
    IdentityLinkStore, NewPrincipal, Principal, RefreshTokenStore, UserStore, hash_refresh_token,
};

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgIdentityLinkStore {
    pool: PgPool,
}

impl PgIdentityLinkStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn principal_from_row(row: &PgRow) -> AuthResult<Principal> {
    let role: String = row.get("role");
    Ok(Principal {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role
            .parse()
            .map_err(|err: String| AuthError::Internal(anyhow!(err)))?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_email(&self, email: &str) -> AuthResult<Option<Principal>> {
        let query = r"
            SELECT id, username, email, password_hash, role
            FROM users
            WHERE email = $1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by email")?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        let query = r"
            SELECT id, username, email, password_hash, role
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by id")?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn create(&self, new_principal: NewPrincipal) -> AuthResult<Uuid> {
        // Uniqueness rides on the table constraints, which keeps the
        // check-then-create race down to a single statement.
        let query = r"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(&new_principal.username)
            .bind(&new_principal.email)
            .bind(&new_principal.password_hash)
            .bind(new_principal.role.as_str())
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(row.get("id")),
            Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict(format!(
                "email {} already registered",
                new_principal.email
            ))),
            Err(err) => Err(AuthError::Internal(
                anyhow::Error::new(err).context("failed to insert principal"),
            )),
        }
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound(format!("principal {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn store(
        &self,
        principal_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        // Only the hash is persisted; the raw value goes back to the caller.
        let query = r"
            INSERT INTO refresh_tokens (token_hash, user_id, expires_at, active)
            VALUES ($1, $2, $3, TRUE)
        ";
        sqlx::query(query)
            .bind(hash_refresh_token(token))
            .bind(principal_id)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to store refresh token")?;
        Ok(())
    }

    async fn validate_and_resolve(&self, token: &str) -> AuthResult<Option<Uuid>> {
        // Single conditional update: of two racing callers, at most one sees
        // the row active. Expired rows are skipped without flipping the flag;
        // retention of expired rows is handled outside this crate.
        let query = r"
            UPDATE refresh_tokens
            SET active = FALSE
            WHERE token_hash = $1
              AND active
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(hash_refresh_token(token))
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume refresh token")?;
        Ok(row.map(|row| row.get("user_id")))
    }

    async fn invalidate(&self, token: &str) -> AuthResult<()> {
        // Idempotent: unknown or already-inactive tokens affect zero rows.
        let query = r"
            UPDATE refresh_tokens
            SET active = FALSE
            WHERE token_hash = $1
        ";
        sqlx::query(query)
            .bind(hash_refresh_token(token))
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to invalidate refresh token")?;
        Ok(())
    }

    async fn invalidate_all(&self, principal_id: Uuid) -> AuthResult<()> {
        let query = r"
            UPDATE refresh_tokens
            SET active = FALSE
            WHERE user_id = $1
              AND active
        ";
        sqlx::query(query)
            .bind(principal_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to invalidate refresh tokens for principal")?;
        Ok(())
    }
}

#[async_trait]
impl IdentityLinkStore for PgIdentityLinkStore {
    async fn find_principal(
        &self,
        provider: &str,
        external_id: &str,
    ) -> AuthResult<Option<Uuid>> {
        let query = r"
            SELECT user_id
            FROM identity_links
            WHERE provider = $1
              AND external_id = $2
        ";
        let row = sqlx::query(query)
            .bind(provider)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup identity link")?;
        Ok(row.map(|row| row.get("user_id")))
    }

    async fn create_link(
        &self,
        principal_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> AuthResult<()> {
        let query = r"
            INSERT INTO identity_links (user_id, provider, external_id)
            VALUES ($1, $2, $3)
        ";
        let result = sqlx::query(query)
            .bind(principal_id)
            .bind(provider)
            .bind(external_id)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict(format!(
                "identity link {provider}/{external_id} already exists"
            ))),
            Err(err) => Err(AuthError::Internal(
                anyhow::Error::new(err).context("failed to insert identity link"),
            )),
        }
    }
}

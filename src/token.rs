//! Stateless access-token codec.
//!
//! Mints and validates compact HS256-signed bearer tokens. The codec is
//! read-only over its configuration after construction, so it is safe to call
//! concurrently without synchronization. An unset signing secret is rejected
//! when [`Config`](crate::config::Config) is built, never per-call.

use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use anyhow::anyhow;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims embedded in an access token. Immutable once minted; they live only
/// for the token's lifetime and are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject: the principal ID.
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Why a token failed validation. Callers treat every variant as
/// "unauthenticated"; the distinction exists for logging only.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    Signature,
    #[error("invalid issuer")]
    IssuerMismatch,
    #[error("invalid audience")]
    AudienceMismatch,
    #[error("malformed token: {0}")]
    Malformed(String),
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl_seconds: i64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let secret = config.signing_secret().expose_secret();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer()]);
        validation.set_audience(&[config.audience()]);
        // No clock skew allowance: expiry is exact.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.issuer().to_string(),
            audience: config.audience().to_string(),
            access_ttl_seconds: i64::try_from(config.access_token_ttl().as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Mint a signed access token for a principal.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if encoding fails.
    pub fn mint(&self, principal_id: Uuid, username: &str, email: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal_id,
            username: username.to_string(),
            email: email.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + self.access_ttl_seconds,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(anyhow!("access token encoding failed: {err}")))
    }

    /// Verify a token's signature, expiry, issuer, and audience.
    ///
    /// # Errors
    /// Returns a [`TokenError`] naming the first check that failed.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
                match err.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::Signature,
                    ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
                    ErrorKind::InvalidAudience => TokenError::AudienceMismatch,
                    _ => TokenError::Malformed(err.to_string()),
                }
            })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_config() -> Config {
        Config::new(SecretString::from("test-signing-secret".to_string()))
            .expect("valid secret")
            .with_issuer("auth.example.test".to_string())
            .with_audience("api.example.test".to_string())
    }

    fn test_claims(iat: i64, exp: i64) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.test".to_string(),
            iss: "auth.example.test".to_string(),
            aud: "api.example.test".to_string(),
            iat,
            exp,
        }
    }

    #[test]
    fn mint_and_validate_round_trip() {
        let codec = TokenCodec::new(&test_config());
        let principal_id = Uuid::new_v4();
        let token = codec
            .mint(principal_id, "alice", "alice@example.test")
            .expect("minting");

        let claims = codec.validate(&token).expect("valid token");
        assert_eq!(claims.sub, principal_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.test");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn rejects_expired_token() {
        let codec = TokenCodec::new(&test_config());
        let now = Utc::now().timestamp();
        let claims = test_claims(now - 7200, now - 3600);
        let token = codec.sign(&claims).expect("signing");

        assert!(matches!(codec.validate(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn rejects_wrong_issuer_and_audience() {
        let codec = TokenCodec::new(&test_config());
        let now = Utc::now().timestamp();

        let mut claims = test_claims(now, now + 3600);
        claims.iss = "someone-else".to_string();
        let token = codec.sign(&claims).expect("signing");
        assert!(matches!(
            codec.validate(&token),
            Err(TokenError::IssuerMismatch)
        ));

        let mut claims = test_claims(now, now + 3600);
        claims.aud = "another-service".to_string();
        let token = codec.sign(&claims).expect("signing");
        assert!(matches!(
            codec.validate(&token),
            Err(TokenError::AudienceMismatch)
        ));
    }

    #[test]
    fn rejects_foreign_signature() {
        let codec = TokenCodec::new(&test_config());
        let token = codec
            .mint(Uuid::new_v4(), "alice", "alice@example.test")
            .expect("minting");

        let other_config = Config::new(SecretString::from("a-different-secret".to_string()))
            .expect("valid secret")
            .with_issuer("auth.example.test".to_string())
            .with_audience("api.example.test".to_string());
        let other = TokenCodec::new(&other_config);

        assert!(matches!(
            other.validate(&token),
            Err(TokenError::Signature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let codec = TokenCodec::new(&test_config());
        let token = codec
            .mint(Uuid::new_v4(), "alice", "alice@example.test")
            .expect("minting");

        let parts: Vec<&str> = token.split('.').collect();
        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .expect("payload is base64url");
        let mut claims: serde_json::Value =
            serde_json::from_slice(&payload).expect("payload is json");
        claims["username"] = serde_json::Value::from("mallory");
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("serialize"));
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            codec.validate(&forged),
            Err(TokenError::Signature)
        ));
    }

    #[test]
    fn rejects_garbage_input() {
        let codec = TokenCodec::new(&test_config());
        assert!(matches!(
            codec.validate("not.a.jwt"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            codec.validate(""),
            Err(TokenError::Malformed(_))
        ));
    }
}

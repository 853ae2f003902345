//! Process-wide configuration, loaded once at startup.
//!
//! A missing or empty signing secret is a construction error: the process
//! should refuse to start rather than fail per-request.

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use std::env;
use std::time::Duration;

pub const DEFAULT_ISSUER: &str = "janua";
pub const DEFAULT_AUDIENCE: &str = "janua";
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

pub const ENV_SIGNING_SECRET: &str = "JANUA_SIGNING_SECRET";
pub const ENV_ISSUER: &str = "JANUA_ISSUER";
pub const ENV_AUDIENCE: &str = "JANUA_AUDIENCE";
pub const ENV_ACCESS_TOKEN_TTL: &str = "JANUA_ACCESS_TOKEN_TTL_SECONDS";
pub const ENV_REFRESH_TOKEN_TTL: &str = "JANUA_REFRESH_TOKEN_TTL_SECONDS";

pub struct Config {
    signing_secret: SecretString,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl Config {
    /// # Errors
    /// Returns an error if the signing secret is empty.
    pub fn new(signing_secret: SecretString) -> Result<Self> {
        use secrecy::ExposeSecret;
        if signing_secret.expose_secret().trim().is_empty() {
            bail!("signing secret must not be empty");
        }
        Ok(Self {
            signing_secret,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
        })
    }

    /// Load configuration from `JANUA_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if the signing secret is unset or empty, or if a TTL
    /// variable is present but not a positive integer.
    pub fn from_env() -> Result<Self> {
        let secret = env::var(ENV_SIGNING_SECRET)
            .with_context(|| format!("{ENV_SIGNING_SECRET} is not set"))?;
        let mut config = Self::new(SecretString::from(secret))?;

        if let Ok(issuer) = env::var(ENV_ISSUER) {
            config = config.with_issuer(issuer);
        }
        if let Ok(audience) = env::var(ENV_AUDIENCE) {
            config = config.with_audience(audience);
        }
        if let Ok(ttl) = env::var(ENV_ACCESS_TOKEN_TTL) {
            let seconds = parse_ttl_seconds(ENV_ACCESS_TOKEN_TTL, &ttl)?;
            config = config.with_access_token_ttl(Duration::from_secs(seconds));
        }
        if let Ok(ttl) = env::var(ENV_REFRESH_TOKEN_TTL) {
            let seconds = parse_ttl_seconds(ENV_REFRESH_TOKEN_TTL, &ttl)?;
            config = config.with_refresh_token_ttl(Duration::from_secs(seconds));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }
}

fn parse_ttl_seconds(name: &str, value: &str) -> Result<u64> {
    let seconds: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a positive integer, got {value:?}"))?;
    if seconds == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(seconds)
}

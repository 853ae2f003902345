//! # Janua (Session & Identity Core)
//!
//! `janua` authenticates users and manages the lifecycle of their sessions:
//! verifying credentials, issuing short-lived signed access tokens and
//! long-lived rotating refresh tokens, linking third-party identities to
//! local accounts, and cascading revocation on security-relevant events.
//!
//! ## Session Model
//!
//! An access token is stateless and signed (HS256); it proves identity until
//! it expires and is validated without touching storage. A refresh token is
//! an opaque random value whose record lives in a store; it is **single-use**:
//! every refresh consumes the presented token and issues a new pair.
//! Revocation cascades — logout kills one session, a password change kills
//! all of them.
//!
//! - **Enumeration resistance:** unknown email and wrong password produce the
//!   same error value; so do not-found, expired, and already-rotated refresh
//!   tokens. Callers cannot probe which accounts or sessions exist.
//! - **Replay resistance:** the store's check-and-consume step is atomic, so
//!   two concurrent refreshes of one token yield exactly one winner.
//! - **Best-effort revocation:** when a primary effect has already succeeded
//!   (the password changed), a failed secondary revocation is logged and does
//!   not fail the operation.
//!
//! ## Boundaries
//!
//! Transport-agnostic: no HTTP types appear in any contract. The embedding
//! service owns routing, cookies, and rate limiting, and installs the
//! `tracing` subscriber. Storage is consumed through the traits in
//! [`session::store`]; Postgres and in-memory adapters are bundled.

pub mod config;
pub mod error;
pub mod identity;
pub mod password;
pub mod session;
pub mod token;

pub use config::Config;
pub use error::{AuthError, AuthResult};
pub use identity::IdentityLinker;
pub use session::{SessionManager, TokenPair};
pub use token::{Claims, TokenCodec, TokenError};

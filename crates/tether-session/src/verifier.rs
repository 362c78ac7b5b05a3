//! Token verification for session authentication.
//!
//! Tether doesn't dictate where tokens come from — that's the auth
//! provider's job. The session core calls the [`TokenVerifier`] trait
//! with the raw token string from an `authenticate` envelope and gets
//! back the claims it needs: subject, device, token id, audiences, and
//! expiry. [`JwtVerifier`] is the production implementation; tests use
//! stubs.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::SessionError;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// The `aud` claim as it appears on the wire: a single string or a
/// list of strings, depending on the issuer.
///
/// Normalized to a list exactly once, at authentication time, via
/// [`into_list`](Self::into_list) — downstream code never branches on
/// the shape again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Audience {
    /// Normalizes the claim to a list.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::One(audience) => vec![audience],
            Self::Many(audiences) => audiences,
        }
    }
}

/// The verified claims a session binds its identity from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user this token identifies.
    pub sub: String,

    /// Device identifier, when the issuer includes one.
    #[serde(default)]
    pub dev: Option<String>,

    /// Token identifier (JWT `jti`).
    #[serde(default)]
    pub jti: Option<String>,

    /// Audience claim; string or list on the wire.
    #[serde(default)]
    pub aud: Audience,

    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

// ---------------------------------------------------------------------------
// TokenVerifier
// ---------------------------------------------------------------------------

/// Validates a client's auth token and returns its claims.
///
/// Object-safe (via `async_trait`) so a session can hold an
/// `Arc<dyn TokenVerifier>` regardless of the concrete implementation:
/// JWT in production, a stub in tests, an auth-service client behind a
/// cache, whatever the deployment needs.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies the given token.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthFailed`] when the token is invalid,
    /// expired, or malformed. The message is surfaced to the peer as
    /// the `auth-failed` hint, so keep it free of server internals.
    async fn verify(&self, token: &str) -> Result<TokenClaims, SessionError>;
}

// ---------------------------------------------------------------------------
// JwtVerifier
// ---------------------------------------------------------------------------

/// A [`TokenVerifier`] over HMAC-signed JWTs (`jsonwebtoken`).
///
/// Signature and `exp` are checked here with zero leeway. Audience
/// checking is deliberately disabled at the library level: audience is
/// not an accept/reject property of the token, it scopes *delivery*
/// per-send, which the session enforces itself.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for HS256 tokens signed with `secret`.
    pub fn hs256(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, SessionError> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| SessionError::AuthFailed(e.to_string()))
    }
}

// =========================================================================
// Tests
// =========================================================================

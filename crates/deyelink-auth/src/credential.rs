//! Credential records and token generation
//!
//! Codes and tokens are opaque strings rendered from 32 random bytes. Stores
//! key them by their SHA-256 hash so the plaintext never sits in memory longer
//! than the response that carries it.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lifetime of an authorization code
pub const AUTHORIZATION_CODE_TTL_SECONDS: i64 = 5 * 60;

/// Lifetime of an access token
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;

/// Identifier of the user a credential was issued to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Subject {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use code exchanged for tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    /// Redirect URI supplied at authorization time, matched exactly on exchange
    pub redirect_uri: String,
    pub issued_at: DateTime<Utc>,
    pub subject: Subject,
}

impl AuthorizationCode {
    /// Codes expire strictly after their TTL has elapsed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at > Duration::seconds(AUTHORIZATION_CODE_TTL_SECONDS)
    }
}

/// Bearer credential for fulfillment requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub subject: Subject,
    pub issued_at: DateTime<Utc>,
}

impl AccessToken {
    /// Valid up to, but not at, one hour after issuance
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= Duration::seconds(ACCESS_TOKEN_TTL_SECONDS)
    }
}

/// Long-lived credential used to mint access tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub subject: Subject,
    pub issued_at: DateTime<Utc>,
}

impl RefreshToken {
    /// `ttl` of `None` means the token never expires
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| now - self.issued_at >= ttl)
    }
}

/// Generate a secure random token (256 bits, URL-safe)
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    BASE64.encode(result)
}

//! Credential storage
//!
//! `CredentialStore` is the seam between the authorization flow and wherever
//! credentials live. `MemoryCredentialStore` keeps everything in process memory:
//! a restart invalidates every outstanding code and token.

use crate::clock::{Clock, SystemClock};
use crate::credential::{
    generate_token, hash_token, AccessToken, AuthorizationCode, RefreshToken, Subject,
};
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Keyed storage for codes, access tokens and refresh tokens
///
/// Every operation must be atomic with respect to concurrent callers. In
/// particular `redeem_code` reads and deletes in one step so a code can be
/// redeemed at most once.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Issue a new authorization code bound to the client, redirect URI and subject
    async fn create_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        subject: &Subject,
    ) -> AuthResult<AuthorizationCode>;

    /// Remove and return the code; fails `InvalidGrant` if unknown or expired
    async fn redeem_code(&self, code: &str) -> AuthResult<AuthorizationCode>;

    async fn issue_access_token(&self, subject: &Subject) -> AuthResult<AccessToken>;

    async fn issue_refresh_token(&self, subject: &Subject) -> AuthResult<RefreshToken>;

    /// Fails `Unauthorized` if unknown or expired; expired tokens are evicted
    async fn lookup_access_token(&self, token: &str) -> AuthResult<AccessToken>;

    /// Fails `InvalidGrant` if unknown or expired; expired tokens are evicted
    async fn lookup_refresh_token(&self, token: &str) -> AuthResult<RefreshToken>;
}

#[derive(Debug, Clone)]
struct CodeRecord {
    client_id: String,
    redirect_uri: String,
    issued_at: DateTime<Utc>,
    subject: Subject,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    subject: Subject,
    issued_at: DateTime<Utc>,
}

/// Number of records currently held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
}

/// In-memory credential store
pub struct MemoryCredentialStore {
    /// Authorization codes indexed by code hash
    codes: RwLock<HashMap<String, CodeRecord>>,
    /// Access tokens indexed by token hash
    access_tokens: RwLock<HashMap<String, TokenRecord>>,
    /// Refresh tokens indexed by token hash
    refresh_tokens: RwLock<HashMap<String, TokenRecord>>,
    clock: Arc<dyn Clock>,
    /// Refresh token lifetime, `None` for no expiry
    refresh_token_ttl: Option<Duration>,
}

impl MemoryCredentialStore {
    /// Create an empty store on the system clock with non-expiring refresh tokens
    pub fn new() -> Self {
        Self {
            codes: RwLock::new(HashMap::new()),
            access_tokens: RwLock::new(HashMap::new()),
            refresh_tokens: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            refresh_token_ttl: None,
        }
    }

    /// Builder pattern: use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder pattern: set refresh token lifetime
    pub fn with_refresh_token_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    /// Count stored records
    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            codes: self.codes.read().await.len(),
            access_tokens: self.access_tokens.read().await.len(),
            refresh_tokens: self.refresh_tokens.read().await.len(),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        subject: &Subject,
    ) -> AuthResult<AuthorizationCode> {
        let code = generate_token();
        let record = CodeRecord {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            issued_at: self.clock.now(),
            subject: subject.clone(),
        };

        let issued = AuthorizationCode {
            code: code.clone(),
            client_id: record.client_id.clone(),
            redirect_uri: record.redirect_uri.clone(),
            issued_at: record.issued_at,
            subject: record.subject.clone(),
        };

        self.codes.write().await.insert(hash_token(&code), record);
        debug!("Issued authorization code for subject {}", subject);
        Ok(issued)
    }

    async fn redeem_code(&self, code: &str) -> AuthResult<AuthorizationCode> {
        let record = self
            .codes
            .write()
            .await
            .remove(&hash_token(code))
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        let redeemed = AuthorizationCode {
            code: code.to_string(),
            client_id: record.client_id,
            redirect_uri: record.redirect_uri,
            issued_at: record.issued_at,
            subject: record.subject,
        };

        if redeemed.is_expired_at(self.clock.now()) {
            debug!("Authorization code expired, discarded");
            return Err(AuthError::invalid_grant("Authorization code expired"));
        }

        Ok(redeemed)
    }

    async fn issue_access_token(&self, subject: &Subject) -> AuthResult<AccessToken> {
        let token = generate_token();
        let issued_at = self.clock.now();
        self.access_tokens.write().await.insert(
            hash_token(&token),
            TokenRecord {
                subject: subject.clone(),
                issued_at,
            },
        );
        Ok(AccessToken {
            token,
            subject: subject.clone(),
            issued_at,
        })
    }

    async fn issue_refresh_token(&self, subject: &Subject) -> AuthResult<RefreshToken> {
        let token = generate_token();
        let issued_at = self.clock.now();
        self.refresh_tokens.write().await.insert(
            hash_token(&token),
            TokenRecord {
                subject: subject.clone(),
                issued_at,
            },
        );
        Ok(RefreshToken {
            token,
            subject: subject.clone(),
            issued_at,
        })
    }

    async fn lookup_access_token(&self, token: &str) -> AuthResult<AccessToken> {
        let key = hash_token(token);
        let mut tokens = self.access_tokens.write().await;
        let record = tokens
            .get(&key)
            .cloned()
            .ok_or_else(|| AuthError::unauthorized("Invalid or expired token"))?;

        let access = AccessToken {
            token: token.to_string(),
            subject: record.subject,
            issued_at: record.issued_at,
        };

        if access.is_expired_at(self.clock.now()) {
            tokens.remove(&key);
            debug!("Access token expired, evicted");
            return Err(AuthError::unauthorized("Invalid or expired token"));
        }

        Ok(access)
    }

    async fn lookup_refresh_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let key = hash_token(token);
        let mut tokens = self.refresh_tokens.write().await;
        let record = tokens
            .get(&key)
            .cloned()
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        let refresh = RefreshToken {
            token: token.to_string(),
            subject: record.subject,
            issued_at: record.issued_at,
        };

        if refresh.is_expired_at(self.clock.now(), self.refresh_token_ttl) {
            tokens.remove(&key);
            debug!("Refresh token expired, evicted");
            return Err(AuthError::invalid_grant("Refresh token expired"));
        }

        Ok(refresh)
    }
}

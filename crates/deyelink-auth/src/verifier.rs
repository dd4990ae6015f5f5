//! Bearer token verification for protected endpoints

use crate::credential::Subject;
use crate::error::{AuthError, AuthResult};
use crate::store::CredentialStore;
use std::sync::Arc;
use tracing::warn;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves bearer credentials to the subject they were issued to
#[derive(Clone)]
pub struct TokenVerifier {
    store: Arc<dyn CredentialStore>,
}

impl TokenVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Verify a raw `Authorization` header value
    pub async fn verify_header(&self, header: Option<&str>) -> AuthResult<Subject> {
        let token = header.and_then(extract_bearer).ok_or_else(|| {
            warn!("Rejected request: missing or invalid authorization header");
            AuthError::unauthorized("Missing or invalid authorization header")
        })?;
        self.verify_token(token).await
    }

    /// Verify a bare access token
    pub async fn verify_token(&self, token: &str) -> AuthResult<Subject> {
        match self.store.lookup_access_token(token).await {
            Ok(access) => Ok(access.subject),
            Err(e) => {
                warn!("Rejected request: {}", e);
                Err(AuthError::unauthorized("Invalid or expired token"))
            }
        }
    }
}

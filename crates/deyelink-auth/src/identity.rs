//! Resource-owner identification for the authorize step
//!
//! The authorize endpoint has no login or consent screen. Whoever resolves the
//! subject plugs in here; `FixedIdentity` binds every link to one configured
//! subject and is meant to be replaced by a real identity provider.

use crate::credential::Subject;
use crate::error::AuthResult;
use crate::flow::AuthorizeRequest;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the user approving this authorization request
    async fn authenticate(&self, request: &AuthorizeRequest) -> AuthResult<Subject>;
}

/// Auto-approves every request as the same subject
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    subject: Subject,
}

impl FixedIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Subject::new(subject),
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn authenticate(&self, _request: &AuthorizeRequest) -> AuthResult<Subject> {
        debug!("Auto-approving authorization as {}", self.subject);
        Ok(self.subject.clone())
    }
}

//! Authorization errors
//!
//! Each variant maps to a machine-readable OAuth2 `error` code.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unregistered client or mismatched client credentials
    #[error("Invalid client credentials")]
    InvalidClient,
    /// Malformed authorize parameters
    #[error("{0}")]
    InvalidRequest(String),
    /// Bad, expired or reused code or refresh token, or redirect URI mismatch
    #[error("{0}")]
    InvalidGrant(String),
    #[error("Grant type not supported: {0}")]
    UnsupportedGrantType(String),
    /// Missing, malformed, unknown or expired bearer credential
    #[error("{0}")]
    Unauthorized(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// OAuth2 `error` code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidClient => "invalid_client",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::Unauthorized(_) => "unauthorized",
        }
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        AuthError::InvalidGrant(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AuthError::Unauthorized(message.into())
    }
}

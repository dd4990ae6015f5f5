//! Gateway error types

use thiserror::Error;

/// Errors surfaced by a device gateway call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{operation} rejected by upstream: {body}")]
    Rejected { operation: &'static str, body: String },

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

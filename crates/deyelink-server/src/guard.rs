//! Bearer credential guard for protected routes
//!
//! Runs before any protected handler. On success the resolved
//! [`Subject`](deyelink_auth::Subject) is attached to the request extensions.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use deyelink_auth::AuthError;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Reject requests without a valid access token
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.verifier.verify_header(header).await {
        Ok(subject) => {
            request.extensions_mut().insert(subject);
            next.run(request).await
        }
        Err(e) => unauthorized(&e),
    }
}

fn unauthorized(error: &AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "error_description": error.to_string(),
        })),
    )
        .into_response()
}

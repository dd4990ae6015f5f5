//! HTTP request handlers
//!
//! Account-linking endpoints, the fulfillment endpoint and service health.

use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use deyelink_auth::{AuthError, AuthorizeRequest, Subject, TokenRequest};
use deyelink_core::{FulfillmentRequest, FulfillmentResponse};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::guard::require_bearer;
use crate::state::AppState;

const SERVICE_NAME: &str = "deyelink";

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/fulfillment", post(fulfillment_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let mut router = Router::new()
        .route("/", get(health_handler))
        // Account linking
        .route("/auth/authorize", get(authorize_handler))
        .route("/auth/token", post(token_handler))
        .merge(protected);

    if state.config.debug_routes {
        warn!("Debug routes enabled: /test/auth and /test/devices are unauthenticated");
        router = router
            .route("/test/auth", get(test_auth_handler))
            .route("/test/devices", get(test_devices_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Service health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Account linking
// ============================================================================

async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    match state.auth.authorize(request).await {
        Ok(redirect) => (StatusCode::FOUND, [(header::LOCATION, redirect.location)]).into_response(),
        Err(AuthError::InvalidClient) => {
            (StatusCode::BAD_REQUEST, "Invalid client_id").into_response()
        }
        Err(AuthError::InvalidRequest(message)) => {
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        Err(AuthError::Unauthorized(message)) => {
            (StatusCode::UNAUTHORIZED, message).into_response()
        }
        Err(e) => {
            error!("Authorize failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Token request read from either a form-encoded or a JSON body
pub struct TokenBody(pub TokenRequest);

#[async_trait]
impl<S> FromRequest<S> for TokenBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let parsed = if is_json {
            Json::<TokenRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Form::<TokenRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        };

        parsed.map(TokenBody).map_err(|message| {
            oauth_error(StatusCode::BAD_REQUEST, "invalid_request", &message)
        })
    }
}

async fn token_handler(State(state): State<Arc<AppState>>, TokenBody(request): TokenBody) -> Response {
    match state.auth.token(request).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => {
            let status = match e {
                AuthError::InvalidClient => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            };
            oauth_error(status, e.error_code(), &e.to_string())
        }
    }
}

fn oauth_error(status: StatusCode, code: &str, description: &str) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "error_description": description,
        })),
    )
        .into_response()
}

// ============================================================================
// Fulfillment
// ============================================================================

async fn fulfillment_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    Json(request): Json<FulfillmentRequest>,
) -> Response {
    match state.dispatcher.dispatch(&request, subject.as_str()).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("Fulfillment failed: {}", e);
            let body = FulfillmentResponse::hard_error(request.request_id.clone(), e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Fresh upstream login, reporting only the token length
async fn test_auth_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.gateway.check_auth().await {
        Ok(token) => Json(json!({
            "success": true,
            "message": "Authentication successful",
            "tokenLength": token.len(),
        }))
        .into_response(),
        Err(e) => {
            error!("Upstream authentication failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Raw gateway listing for connectivity checks
async fn test_devices_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.gateway.list_devices().await {
        Ok(devices) => Json(json!({ "success": true, "devices": devices })).into_response(),
        Err(e) => {
            error!("Device listing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

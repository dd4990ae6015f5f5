//! Deyelink Server - Axum-based HTTP server
//!
//! Serves the account-linking endpoints and the bearer-protected fulfillment
//! endpoint.

pub mod guard;
pub mod http;
pub mod state;
pub mod tls;

pub use http::create_router;
pub use state::AppState;
pub use tls::create_rustls_config_from_files;

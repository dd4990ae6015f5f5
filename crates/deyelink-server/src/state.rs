//! Shared application state

use deyelink_auth::{AuthorizationServer, TokenVerifier};
use deyelink_core::Config;
use deyelink_fulfillment::IntentDispatcher;
use deyelink_gateway::DeviceGateway;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Authorize and token endpoints
    pub auth: AuthorizationServer,
    /// Bearer credential check for protected routes
    pub verifier: TokenVerifier,
    pub dispatcher: IntentDispatcher,
    /// Raw gateway access for the diagnostic listing
    pub gateway: Arc<dyn DeviceGateway>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: Config,
        auth: AuthorizationServer,
        verifier: TokenVerifier,
        gateway: Arc<dyn DeviceGateway>,
    ) -> Self {
        Self {
            config,
            auth,
            verifier,
            dispatcher: IntentDispatcher::new(gateway.clone()),
            gateway,
        }
    }
}

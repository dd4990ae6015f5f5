//! Deyelink Gateway
//!
//! The fulfillment engine talks to physical devices only through the
//! [`DeviceGateway`] capability trait: list devices, fetch latest status for a
//! batch of ids, and set a device's work mode.
//!
//! - **DeyeCloudClient**: the production implementation against the Deye Cloud
//!   developer API, with lazy account authentication and token caching.

mod deye;
mod error;
mod gateway;

pub use deye::{hash_password, DeyeCloudClient, DeyeCredentials, TOKEN_VALIDITY_DAYS};
pub use error::{GatewayError, GatewayResult};
pub use gateway::DeviceGateway;

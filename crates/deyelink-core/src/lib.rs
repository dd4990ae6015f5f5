//! Deyelink Core - Shared configuration and protocol definitions
//!
//! This crate provides the foundational types used across all Deyelink components:
//! the process configuration, the shared error type, and the smart-home
//! fulfillment protocol (intent requests, intent responses and the canonical
//! device description delivered during discovery).

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;

pub use config::{Config, DEFAULT_DEYE_BASE_URL, DEFAULT_SUBJECT};
pub use device::{CanonicalDevice, DeviceInfo, DeviceName, DeviceTrait, DeviceType};
pub use error::{Error, Result};
pub use protocol::{FulfillmentRequest, FulfillmentResponse, Intent, ResponsePayload};

//! Canonical smart-home device description
//!
//! The normalized shape delivered to the smart-home platform during discovery.
//! Canonical devices are never stored; they are recomputed from the upstream
//! device records on every SYNC.

use serde::{Deserialize, Serialize};

/// Smart-home device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    /// Generic light-like device, the fallback category
    #[serde(rename = "action.devices.types.LIGHT")]
    Light,
    /// Togglable switch (inverters, batteries)
    #[serde(rename = "action.devices.types.SWITCH")]
    Switch,
}

/// Capability tag advertised for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceTrait {
    #[serde(rename = "action.devices.traits.OnOff")]
    OnOff,
}

/// Names the platform may use to address the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceName {
    pub default_names: Vec<String>,
    pub name: String,
    pub nicknames: Vec<String>,
}

/// Hardware description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub hw_version: String,
    pub sw_version: String,
}

/// A device as presented to the smart-home platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDevice {
    /// Upstream device identifier (serial number)
    pub id: String,
    /// Device category
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Supported capabilities
    pub traits: Vec<DeviceTrait>,
    pub name: DeviceName,
    /// Whether the device reports state proactively
    pub will_report_state: bool,
    pub device_info: DeviceInfo,
}

impl CanonicalDevice {
    /// Human-readable name shown in the platform's app
    pub fn display_name(&self) -> &str {
        &self.name.name
    }

    pub fn manufacturer(&self) -> &str {
        &self.device_info.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.device_info.model
    }
}

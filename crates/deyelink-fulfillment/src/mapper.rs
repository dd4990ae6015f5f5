//! Upstream device record to canonical device mapping
//!
//! Classification is an ordered table of product-type keyword rules checked
//! against the lowercased product type; the first match wins and anything
//! unmatched falls back to a light. Mapping is total: any JSON value yields a
//! device, missing fields fall back to fixed defaults.

use deyelink_core::{CanonicalDevice, DeviceInfo, DeviceName, DeviceTrait, DeviceType};
use serde_json::Value;

pub const MANUFACTURER: &str = "Deye";
pub const DEFAULT_DEVICE_NAME: &str = "Deye Device";
pub const UNKNOWN_MODEL: &str = "Unknown";
const HARDWARE_VERSION: &str = "1.0";
const SOFTWARE_VERSION: &str = "1.0";

/// A product-type rule and the presentation it selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Matches when the lowercased product type contains any keyword
    pub keywords: &'static [&'static str],
    pub device_type: DeviceType,
    pub traits: &'static [DeviceTrait],
}

impl ClassificationRule {
    fn matches(&self, product_type: &str) -> bool {
        self.keywords.iter().any(|k| product_type.contains(k))
    }
}

/// Evaluated in order
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[ClassificationRule {
    keywords: &["inverter", "battery"],
    device_type: DeviceType::Switch,
    traits: &[DeviceTrait::OnOff],
}];

static FALLBACK_RULE: ClassificationRule = ClassificationRule {
    keywords: &[],
    device_type: DeviceType::Light,
    traits: &[DeviceTrait::OnOff],
};

/// Pick the rule for a product type
pub fn classify(product_type: Option<&str>) -> &'static ClassificationRule {
    let Some(product_type) = product_type else {
        return &FALLBACK_RULE;
    };
    let product_type = product_type.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| rule.matches(&product_type))
        .unwrap_or(&FALLBACK_RULE)
}

/// Fields read from an upstream device record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_sn: Option<String>,
    pub sn: Option<String>,
    pub device_name: Option<String>,
    pub name: Option<String>,
    pub product_type: Option<String>,
}

impl DeviceRecord {
    /// Read a record leniently: numbers count as strings, empty strings as absent
    pub fn from_value(value: &Value) -> Self {
        Self {
            device_sn: text_field(value, "deviceSn"),
            sn: text_field(value, "sn"),
            device_name: text_field(value, "deviceName"),
            name: text_field(value, "name"),
            product_type: text_field(value, "productType"),
        }
    }

    /// Serial number, preferring `deviceSn`
    pub fn id(&self) -> Option<&str> {
        self.device_sn.as_deref().or(self.sn.as_deref())
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map an upstream record to the device presented on SYNC
pub fn map_device(record: &DeviceRecord) -> CanonicalDevice {
    let rule = classify(record.product_type.as_deref());

    let display_name = record
        .device_name
        .as_deref()
        .or(record.name.as_deref())
        .unwrap_or(DEFAULT_DEVICE_NAME)
        .to_string();
    let default_name = record
        .device_name
        .clone()
        .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());

    CanonicalDevice {
        id: record.id().unwrap_or_default().to_string(),
        device_type: rule.device_type,
        traits: rule.traits.to_vec(),
        name: DeviceName {
            default_names: vec![default_name],
            name: display_name.clone(),
            nicknames: vec![display_name],
        },
        will_report_state: true,
        device_info: DeviceInfo {
            manufacturer: MANUFACTURER.to_string(),
            model: record
                .product_type
                .clone()
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            hw_version: HARDWARE_VERSION.to_string(),
            sw_version: SOFTWARE_VERSION.to_string(),
        },
    }
}

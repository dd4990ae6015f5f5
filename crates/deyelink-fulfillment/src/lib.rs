//! Deyelink Fulfillment - Smart-home intent handling
//!
//! Routes each fulfillment request by intent to one of four handlers:
//!
//! - **SYNC**: list devices from the gateway and map them to canonical devices
//! - **QUERY**: fetch status for all requested ids in one batch, report per device
//! - **EXECUTE**: translate on/off commands into per-device work-mode updates
//! - **DISCONNECT**: acknowledge account unlinking
//!
//! Domain failures never escape as errors: they are folded into the response
//! payload, either for the whole request (`hardError`) or per device.

pub mod dispatcher;
pub mod mapper;

pub use dispatcher::{FulfillmentError, IntentDispatcher, MODE_OFF, MODE_ON};
pub use mapper::{classify, map_device, ClassificationRule, DeviceRecord, CLASSIFICATION_RULES};

//! Smart-home fulfillment protocol
//!
//! Every fulfillment request carries an opaque `requestId` and a list of
//! inputs whose first entry names the intent. Responses echo the `requestId`
//! verbatim and carry an intent-specific payload, or an error payload.

use crate::device::CanonicalDevice;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const INTENT_SYNC: &str = "action.devices.SYNC";
pub const INTENT_QUERY: &str = "action.devices.QUERY";
pub const INTENT_EXECUTE: &str = "action.devices.EXECUTE";
pub const INTENT_DISCONNECT: &str = "action.devices.DISCONNECT";

/// The on/off toggle command, the only one devices support
pub const COMMAND_ON_OFF: &str = "action.devices.commands.OnOff";

/// Intent discriminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Device discovery
    Sync,
    /// State query
    Query,
    /// Command execution
    Execute,
    /// Account unlinked
    Disconnect,
    /// Anything else, kept verbatim for logging
    Unknown(String),
}

impl Intent {
    pub fn parse(s: &str) -> Self {
        match s {
            INTENT_SYNC => Self::Sync,
            INTENT_QUERY => Self::Query,
            INTENT_EXECUTE => Self::Execute,
            INTENT_DISCONNECT => Self::Disconnect,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sync => INTENT_SYNC,
            Self::Query => INTENT_QUERY,
            Self::Execute => INTENT_EXECUTE,
            Self::Disconnect => INTENT_DISCONNECT,
            Self::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Inbound fulfillment request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRequest {
    /// Opaque id echoed in the response
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub inputs: Vec<RequestInput>,
}

impl FulfillmentRequest {
    /// The input that drives dispatch
    pub fn first_input(&self) -> Option<&RequestInput> {
        self.inputs.first()
    }
}

/// A single request input: intent name plus untyped payload
///
/// The intent is kept as raw JSON so a missing or non-string value still
/// reaches dispatch and is answered as an unknown intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInput {
    #[serde(default)]
    pub intent: Value,
    #[serde(default)]
    pub payload: Value,
}

impl RequestInput {
    pub fn intent(&self) -> Intent {
        match &self.intent {
            Value::String(name) => Intent::parse(name),
            other => Intent::Unknown(other.to_string()),
        }
    }
}

/// SYNC input payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    #[serde(default)]
    pub agent_user_id: Option<String>,
}

/// Reference to a device in a QUERY or EXECUTE payload
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRef {
    pub id: String,
}

/// QUERY input payload
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequestPayload {
    pub devices: Vec<DeviceRef>,
}

/// EXECUTE input payload
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequestPayload {
    pub commands: Vec<CommandGroup>,
}

/// Target devices plus the executions to apply to each
#[derive(Debug, Clone, Deserialize)]
pub struct CommandGroup {
    pub devices: Vec<DeviceRef>,
    pub execution: Vec<Execution>,
}

impl CommandGroup {
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }
}

/// A single command with its parameters
#[derive(Debug, Clone, Deserialize)]
pub struct Execution {
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

// ============================================================================
// Responses
// ============================================================================

/// Outbound fulfillment response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub request_id: String,
    pub payload: ResponsePayload,
}

impl FulfillmentResponse {
    pub fn new(request_id: impl Into<String>, payload: ResponsePayload) -> Self {
        Self {
            request_id: request_id.into(),
            payload,
        }
    }

    /// Whole-request failure with a diagnostic message
    pub fn hard_error(request_id: impl Into<String>, debug_string: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ResponsePayload::Error(ErrorPayload {
                error_code: ErrorCode::HardError,
                debug_string: Some(debug_string.into()),
            }),
        )
    }

    /// Unknown intent
    pub fn function_not_supported(request_id: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ResponsePayload::Error(ErrorPayload {
                error_code: ErrorCode::FunctionNotSupported,
                debug_string: None,
            }),
        )
    }
}

/// Intent-specific response payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Sync(SyncResponsePayload),
    Query(QueryResponsePayload),
    Execute(ExecuteResponsePayload),
    Disconnect(EmptyPayload),
    Error(ErrorPayload),
}

/// Protocol error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    HardError,
    FunctionNotSupported,
    DeviceNotFound,
}

/// Per-item outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_string: Option<String>,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponsePayload {
    pub agent_user_id: String,
    pub devices: Vec<CanonicalDevice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponsePayload {
    pub devices: BTreeMap<String, DeviceState>,
}

/// Reported state of one queried device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl DeviceState {
    /// Device answered with a status record
    pub fn reachable(on: bool) -> Self {
        Self {
            online: true,
            on: Some(on),
            status: Status::Success,
            error_code: None,
        }
    }

    /// Device absent from the gateway's status response
    pub fn not_found() -> Self {
        Self {
            online: false,
            on: None,
            status: Status::Error,
            error_code: Some(ErrorCode::DeviceNotFound),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResponsePayload {
    pub commands: Vec<CommandResult>,
}

/// Outcome of a command for one or more devices
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub ids: Vec<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<ExecutionStates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl CommandResult {
    pub fn success(id: impl Into<String>, on: bool) -> Self {
        Self {
            ids: vec![id.into()],
            status: Status::Success,
            states: Some(ExecutionStates { online: true, on }),
            error_code: None,
        }
    }

    pub fn error(ids: Vec<String>, error_code: ErrorCode) -> Self {
        Self {
            ids,
            status: Status::Error,
            states: None,
            error_code: Some(error_code),
        }
    }
}

/// Device state after a successful command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionStates {
    pub online: bool,
    pub on: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_parsing() {
        assert_eq!(Intent::parse("action.devices.SYNC"), Intent::Sync);
        assert_eq!(Intent::parse("action.devices.EXECUTE"), Intent::Execute);
        assert_eq!(
            Intent::parse("action.devices.REBOOT"),
            Intent::Unknown("action.devices.REBOOT".to_string())
        );
        assert_eq!(Intent::Query.to_string(), "action.devices.QUERY");
    }

    #[test]
    fn test_request_deserialization() {
        let request: FulfillmentRequest = serde_json::from_value(json!({
            "requestId": "ff36a3cc",
            "inputs": [{
                "intent": "action.devices.QUERY",
                "payload": { "devices": [{ "id": "SN1", "customData": {} }] }
            }]
        }))
        .unwrap();

        assert_eq!(request.request_id, "ff36a3cc");
        let input = request.first_input().unwrap();
        assert_eq!(input.intent(), Intent::Query);
        let payload: QueryRequestPayload = serde_json::from_value(input.payload.clone()).unwrap();
        assert_eq!(payload.devices[0].id, "SN1");
    }

    #[test]
    fn test_missing_or_odd_intent_is_unknown() {
        let request: FulfillmentRequest = serde_json::from_value(json!({
            "requestId": "r-1",
            "inputs": [{ "payload": {} }, { "intent": null }, { "intent": 7 }]
        }))
        .unwrap();

        assert_eq!(request.inputs[0].intent(), Intent::Unknown("null".to_string()));
        assert_eq!(request.inputs[1].intent(), Intent::Unknown("null".to_string()));
        assert_eq!(request.inputs[2].intent(), Intent::Unknown("7".to_string()));
    }

    #[test]
    fn test_disconnect_payload_is_empty_object() {
        let response = FulfillmentResponse::new("r1", ResponsePayload::Disconnect(EmptyPayload {}));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "requestId": "r1", "payload": {} })
        );
    }

    #[test]
    fn test_error_payload_shapes() {
        let unsupported = serde_json::to_value(FulfillmentResponse::function_not_supported("r2")).unwrap();
        assert_eq!(
            unsupported,
            json!({ "requestId": "r2", "payload": { "errorCode": "functionNotSupported" } })
        );

        let hard = serde_json::to_value(FulfillmentResponse::hard_error("r3", "boom")).unwrap();
        assert_eq!(hard["payload"]["errorCode"], "hardError");
        assert_eq!(hard["payload"]["debugString"], "boom");
    }

    #[test]
    fn test_device_state_shapes() {
        assert_eq!(
            serde_json::to_value(DeviceState::not_found()).unwrap(),
            json!({ "online": false, "status": "ERROR", "errorCode": "deviceNotFound" })
        );
        assert_eq!(
            serde_json::to_value(DeviceState::reachable(false)).unwrap(),
            json!({ "online": true, "on": false, "status": "SUCCESS" })
        );
    }
}

//! Intent dispatch
//!
//! Stateless: each request is routed by the intent of its first input to
//! exactly one handler. QUERY and EXECUTE build their responses from
//! per-device outcomes so one device's failure never aborts the others.

use crate::mapper::{map_device, DeviceRecord};
use deyelink_core::protocol::{
    CommandGroup, CommandResult, DeviceState, EmptyPayload, ErrorCode, ExecuteRequestPayload,
    ExecuteResponsePayload, Execution, QueryRequestPayload, QueryResponsePayload, RequestInput,
    SyncRequestPayload, SyncResponsePayload, COMMAND_ON_OFF,
};
use deyelink_core::{FulfillmentRequest, FulfillmentResponse, Intent, ResponsePayload};
use deyelink_gateway::DeviceGateway;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Work mode that switches a device on
pub const MODE_ON: i64 = 1;
/// Work mode that switches a device off
pub const MODE_OFF: i64 = 0;

/// Keys under which the gateway may wrap its device listing
const LISTING_KEYS: &[&str] = &["list", "devices"];

/// Failures that cannot be expressed inside an intent response
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("Request has no inputs")]
    MissingInput,
}

/// Routes fulfillment requests to intent handlers
pub struct IntentDispatcher {
    gateway: Arc<dyn DeviceGateway>,
}

impl IntentDispatcher {
    pub fn new(gateway: Arc<dyn DeviceGateway>) -> Self {
        Self { gateway }
    }

    /// Handle a fulfillment request on behalf of `subject`
    ///
    /// `subject` is the identity resolved from the bearer credential; it is the
    /// SYNC `agentUserId` when the request does not carry one.
    pub async fn dispatch(
        &self,
        request: &FulfillmentRequest,
        subject: &str,
    ) -> Result<FulfillmentResponse, FulfillmentError> {
        let input = request.first_input().ok_or(FulfillmentError::MissingInput)?;
        let request_id = request.request_id.as_str();
        let intent = input.intent();

        info!("Handling {} intent", intent);

        let response = match intent {
            Intent::Sync => self.handle_sync(request_id, input, subject).await,
            Intent::Query => self.handle_query(request_id, input).await,
            Intent::Execute => self.handle_execute(request_id, input).await,
            Intent::Disconnect => {
                info!("Account unlinked by {}", subject);
                FulfillmentResponse::new(request_id, ResponsePayload::Disconnect(EmptyPayload {}))
            }
            Intent::Unknown(name) => {
                warn!("Unknown intent: {}", name);
                FulfillmentResponse::function_not_supported(request_id)
            }
        };

        Ok(response)
    }

    async fn handle_sync(
        &self,
        request_id: &str,
        input: &RequestInput,
        subject: &str,
    ) -> FulfillmentResponse {
        let payload: SyncRequestPayload =
            serde_json::from_value(input.payload.clone()).unwrap_or_default();

        let listing = match self.gateway.list_devices().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("SYNC failed: {}", e);
                return FulfillmentResponse::hard_error(request_id, e.to_string());
            }
        };

        let devices: Vec<_> = normalize_listing(listing)
            .iter()
            .map(|record| map_device(&DeviceRecord::from_value(record)))
            .collect();
        info!("Found {} devices", devices.len());

        FulfillmentResponse::new(
            request_id,
            ResponsePayload::Sync(SyncResponsePayload {
                agent_user_id: payload
                    .agent_user_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| subject.to_string()),
                devices,
            }),
        )
    }

    async fn handle_query(&self, request_id: &str, input: &RequestInput) -> FulfillmentResponse {
        let payload: QueryRequestPayload = match serde_json::from_value(input.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                return FulfillmentResponse::hard_error(
                    request_id,
                    format!("Malformed QUERY payload: {}", e),
                )
            }
        };
        let ids: Vec<String> = payload.devices.into_iter().map(|d| d.id).collect();
        debug!("Querying devices: {}", ids.join(", "));

        let records = if ids.is_empty() {
            Vec::new()
        } else {
            match self.gateway.device_status(&ids).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("QUERY failed: {}", e);
                    return FulfillmentResponse::hard_error(request_id, e.to_string());
                }
            }
        };

        let devices: BTreeMap<String, DeviceState> = ids
            .into_iter()
            .map(|id| {
                let state = match find_status(&records, &id) {
                    Some(record) => DeviceState::reachable(infer_on(record)),
                    None => DeviceState::not_found(),
                };
                (id, state)
            })
            .collect();

        FulfillmentResponse::new(
            request_id,
            ResponsePayload::Query(QueryResponsePayload { devices }),
        )
    }

    async fn handle_execute(&self, request_id: &str, input: &RequestInput) -> FulfillmentResponse {
        let payload: ExecuteRequestPayload = match serde_json::from_value(input.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                return FulfillmentResponse::hard_error(
                    request_id,
                    format!("Malformed EXECUTE payload: {}", e),
                )
            }
        };

        let mut results = Vec::new();
        for group in &payload.commands {
            for execution in &group.execution {
                results.extend(self.run_execution(group, execution).await);
            }
        }

        FulfillmentResponse::new(
            request_id,
            ResponsePayload::Execute(ExecuteResponsePayload { commands: results }),
        )
    }

    /// Apply one execution to every device of its group
    async fn run_execution(&self, group: &CommandGroup, execution: &Execution) -> Vec<CommandResult> {
        let ids = group.device_ids();
        debug!("Executing {} on devices: {}", execution.command, ids.join(", "));

        if execution.command != COMMAND_ON_OFF {
            warn!("Unsupported command: {}", execution.command);
            return vec![CommandResult::error(ids, ErrorCode::FunctionNotSupported)];
        }

        let Some(on) = execution.params.get("on").and_then(Value::as_bool) else {
            warn!("OnOff command without a boolean `on` parameter");
            return ids
                .into_iter()
                .map(|id| CommandResult::error(vec![id], ErrorCode::HardError))
                .collect();
        };

        let mode = if on { MODE_ON } else { MODE_OFF };
        let calls = ids.into_iter().map(|id| async move {
            match self.gateway.set_mode(&id, mode).await {
                Ok(_) => CommandResult::success(id, on),
                Err(e) => {
                    warn!("Error executing command on device {}: {}", id, e);
                    CommandResult::error(vec![id], ErrorCode::HardError)
                }
            }
        });
        join_all(calls).await
    }
}

/// Accept a bare list or a list wrapped under one of the known keys
fn normalize_listing(listing: Value) -> Vec<Value> {
    match listing {
        Value::Array(records) => records,
        Value::Object(mut map) => LISTING_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn find_status<'a>(records: &'a [Value], id: &str) -> Option<&'a Value> {
    records.iter().find(|record| {
        let record = DeviceRecord::from_value(record);
        record.device_sn.as_deref() == Some(id) || record.sn.as_deref() == Some(id)
    })
}

/// A device is off when its data says offline, reports status 0, or power 0
fn infer_on(record: &Value) -> bool {
    let Some(data) = record.get("data") else {
        return true;
    };
    let status = data.get("status");
    let offline = status.and_then(Value::as_str) == Some("offline");
    let zero_status = status.and_then(Value::as_f64) == Some(0.0);
    let zero_power = data.get("power").and_then(Value::as_f64) == Some(0.0);
    !(offline || zero_status || zero_power)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deyelink_gateway::{GatewayError, GatewayResult};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockGateway {
        /// `None` makes listing fail
        listing: Option<Value>,
        /// `None` makes status fail
        statuses: Option<Vec<Value>>,
        failing_devices: HashSet<String>,
        status_calls: Mutex<Vec<Vec<String>>>,
        mode_calls: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl DeviceGateway for MockGateway {
        async fn list_devices(&self) -> GatewayResult<Value> {
            self.listing
                .clone()
                .ok_or_else(|| GatewayError::Unavailable("listing down".to_string()))
        }

        async fn device_status(&self, ids: &[String]) -> GatewayResult<Vec<Value>> {
            self.status_calls.lock().unwrap().push(ids.to_vec());
            self.statuses
                .clone()
                .ok_or_else(|| GatewayError::Unavailable("status down".to_string()))
        }

        async fn check_auth(&self) -> GatewayResult<String> {
            Ok("session".to_string())
        }

        async fn set_mode(&self, id: &str, mode: i64) -> GatewayResult<Value> {
            self.mode_calls.lock().unwrap().push((id.to_string(), mode));
            if self.failing_devices.contains(id) {
                return Err(GatewayError::Unavailable(format!("{} unreachable", id)));
            }
            Ok(json!({ "orderId": 1 }))
        }
    }

    fn dispatcher(gateway: MockGateway) -> (IntentDispatcher, Arc<MockGateway>) {
        let gateway = Arc::new(gateway);
        (IntentDispatcher::new(gateway.clone()), gateway)
    }

    fn request(intent: &str, payload: Value) -> FulfillmentRequest {
        serde_json::from_value(json!({
            "requestId": "req-42",
            "inputs": [{ "intent": intent, "payload": payload }]
        }))
        .unwrap()
    }

    async fn dispatch_json(dispatcher: &IntentDispatcher, request: FulfillmentRequest) -> Value {
        let response = dispatcher.dispatch(&request, "deye-user").await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    fn execute_on_off(ids: &[&str], params: Value) -> FulfillmentRequest {
        let devices: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        request(
            "action.devices.EXECUTE",
            json!({
                "commands": [{
                    "devices": devices,
                    "execution": [{ "command": "action.devices.commands.OnOff", "params": params }]
                }]
            }),
        )
    }

    #[tokio::test]
    async fn test_sync_accepts_all_listing_shapes() {
        for listing in [
            json!([{ "deviceSn": "A", "productType": "Hybrid Inverter" }]),
            json!({ "list": [{ "deviceSn": "A", "productType": "Hybrid Inverter" }] }),
            json!({ "devices": [{ "deviceSn": "A", "productType": "Hybrid Inverter" }] }),
        ] {
            let (dispatcher, _) = dispatcher(MockGateway {
                listing: Some(listing),
                ..Default::default()
            });
            let response = dispatch_json(&dispatcher, request("action.devices.SYNC", json!({}))).await;

            assert_eq!(response["requestId"], "req-42");
            assert_eq!(response["payload"]["agentUserId"], "deye-user");
            assert_eq!(response["payload"]["devices"][0]["id"], "A");
            assert_eq!(
                response["payload"]["devices"][0]["type"],
                "action.devices.types.SWITCH"
            );
        }
    }

    #[tokio::test]
    async fn test_sync_echoes_agent_user_id_and_tolerates_odd_records() {
        let (dispatcher, _) = dispatcher(MockGateway {
            listing: Some(json!([{ "sn": "B" }, 17, null])),
            ..Default::default()
        });
        let response = dispatch_json(
            &dispatcher,
            request("action.devices.SYNC", json!({ "agentUserId": "agent-7" })),
        )
        .await;

        assert_eq!(response["payload"]["agentUserId"], "agent-7");
        let devices = response["payload"]["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0]["type"], "action.devices.types.LIGHT");
    }

    #[tokio::test]
    async fn test_sync_gateway_failure_is_hard_error() {
        let (dispatcher, _) = dispatcher(MockGateway::default());
        let response = dispatch_json(&dispatcher, request("action.devices.SYNC", Value::Null)).await;

        assert_eq!(response["requestId"], "req-42");
        assert_eq!(response["payload"]["errorCode"], "hardError");
        assert!(response["payload"]["debugString"]
            .as_str()
            .unwrap()
            .contains("listing down"));
    }

    #[tokio::test]
    async fn test_query_reports_missing_devices_individually() {
        let (dispatcher, gateway) = dispatcher(MockGateway {
            statuses: Some(vec![json!({ "deviceSn": "A", "data": { "power": 1500 } })]),
            ..Default::default()
        });
        let response = dispatch_json(
            &dispatcher,
            request(
                "action.devices.QUERY",
                json!({ "devices": [{ "id": "A" }, { "id": "B" }] }),
            ),
        )
        .await;

        assert_eq!(
            response["payload"]["devices"],
            json!({
                "A": { "online": true, "on": true, "status": "SUCCESS" },
                "B": { "online": false, "status": "ERROR", "errorCode": "deviceNotFound" }
            })
        );
        // One batched status call for all ids
        assert_eq!(
            *gateway.status_calls.lock().unwrap(),
            vec![vec!["A".to_string(), "B".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_query_infers_off_state() {
        let (dispatcher, _) = dispatcher(MockGateway {
            statuses: Some(vec![
                json!({ "deviceSn": "offline", "data": { "status": "offline" } }),
                json!({ "deviceSn": "zero-status", "data": { "status": 0 } }),
                json!({ "sn": "zero-power", "data": { "power": 0.0 } }),
                json!({ "deviceSn": "running", "data": { "status": 1, "power": 300 } }),
                json!({ "deviceSn": "bare" }),
            ]),
            ..Default::default()
        });
        let response = dispatch_json(
            &dispatcher,
            request(
                "action.devices.QUERY",
                json!({ "devices": [
                    { "id": "offline" }, { "id": "zero-status" }, { "id": "zero-power" },
                    { "id": "running" }, { "id": "bare" }
                ] }),
            ),
        )
        .await;

        let devices = &response["payload"]["devices"];
        assert_eq!(devices["offline"]["on"], false);
        assert_eq!(devices["zero-status"]["on"], false);
        assert_eq!(devices["zero-power"]["on"], false);
        assert_eq!(devices["running"]["on"], true);
        assert_eq!(devices["bare"]["on"], true);
        assert_eq!(devices["bare"]["online"], true);
    }

    #[tokio::test]
    async fn test_query_gateway_failure_is_hard_error() {
        let (dispatcher, _) = dispatcher(MockGateway::default());
        let response = dispatch_json(
            &dispatcher,
            request("action.devices.QUERY", json!({ "devices": [{ "id": "A" }] })),
        )
        .await;
        assert_eq!(response["payload"]["errorCode"], "hardError");
    }

    #[tokio::test]
    async fn test_malformed_query_payload_is_hard_error() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(
            &dispatcher,
            request("action.devices.QUERY", json!({ "devices": "A" })),
        )
        .await;
        assert_eq!(response["payload"]["errorCode"], "hardError");
        assert!(gateway.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_on_sets_mode_one() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(&dispatcher, execute_on_off(&["X"], json!({ "on": true }))).await;

        assert_eq!(*gateway.mode_calls.lock().unwrap(), vec![("X".to_string(), MODE_ON)]);
        assert_eq!(
            response["payload"]["commands"],
            json!([{ "ids": ["X"], "status": "SUCCESS", "states": { "online": true, "on": true } }])
        );
    }

    #[tokio::test]
    async fn test_execute_off_sets_mode_zero() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(&dispatcher, execute_on_off(&["X"], json!({ "on": false }))).await;

        assert_eq!(*gateway.mode_calls.lock().unwrap(), vec![("X".to_string(), MODE_OFF)]);
        assert_eq!(response["payload"]["commands"][0]["states"]["on"], false);
    }

    #[tokio::test]
    async fn test_execute_failure_is_per_device() {
        let (dispatcher, gateway) = dispatcher(MockGateway {
            failing_devices: HashSet::from(["B".to_string()]),
            ..Default::default()
        });
        let response =
            dispatch_json(&dispatcher, execute_on_off(&["A", "B", "C"], json!({ "on": true }))).await;

        assert_eq!(gateway.mode_calls.lock().unwrap().len(), 3);
        assert_eq!(
            response["payload"]["commands"],
            json!([
                { "ids": ["A"], "status": "SUCCESS", "states": { "online": true, "on": true } },
                { "ids": ["B"], "status": "ERROR", "errorCode": "hardError" },
                { "ids": ["C"], "status": "SUCCESS", "states": { "online": true, "on": true } }
            ])
        );
    }

    #[tokio::test]
    async fn test_unsupported_command_does_not_abort_siblings() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(
            &dispatcher,
            request(
                "action.devices.EXECUTE",
                json!({ "commands": [
                    {
                        "devices": [{ "id": "A" }, { "id": "B" }],
                        "execution": [
                            { "command": "action.devices.commands.BrightnessAbsolute", "params": { "brightness": 40 } },
                            { "command": "action.devices.commands.OnOff", "params": { "on": true } }
                        ]
                    }
                ] }),
            ),
        )
        .await;

        let commands = response["payload"]["commands"].as_array().unwrap();
        assert_eq!(
            commands[0],
            json!({ "ids": ["A", "B"], "status": "ERROR", "errorCode": "functionNotSupported" })
        );
        assert_eq!(commands.len(), 3);
        assert_eq!(gateway.mode_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_on_off_without_on_param() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(&dispatcher, execute_on_off(&["A"], json!({}))).await;

        assert!(gateway.mode_calls.lock().unwrap().is_empty());
        assert_eq!(response["payload"]["commands"][0]["errorCode"], "hardError");
    }

    #[tokio::test]
    async fn test_disconnect_acknowledges_without_gateway() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let response = dispatch_json(&dispatcher, request("action.devices.DISCONNECT", Value::Null)).await;

        assert_eq!(response, json!({ "requestId": "req-42", "payload": {} }));
        assert!(gateway.mode_calls.lock().unwrap().is_empty());
        assert!(gateway.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_intent_echoes_request_id() {
        let (dispatcher, _) = dispatcher(MockGateway::default());
        let mut req = request("action.devices.REBOOT", Value::Null);
        req.request_id = "6894439706274654512".to_string();
        let response = dispatch_json(&dispatcher, req).await;

        assert_eq!(
            response,
            json!({
                "requestId": "6894439706274654512",
                "payload": { "errorCode": "functionNotSupported" }
            })
        );
    }

    #[tokio::test]
    async fn test_input_without_intent_is_not_supported() {
        let (dispatcher, gateway) = dispatcher(MockGateway::default());
        let req: FulfillmentRequest = serde_json::from_value(json!({
            "requestId": "r",
            "inputs": [{ "payload": {} }]
        }))
        .unwrap();
        let response = dispatch_json(&dispatcher, req).await;

        assert_eq!(
            response,
            json!({ "requestId": "r", "payload": { "errorCode": "functionNotSupported" } })
        );
        assert!(gateway.mode_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_without_inputs() {
        let (dispatcher, _) = dispatcher(MockGateway::default());
        let request = FulfillmentRequest {
            request_id: "r".to_string(),
            inputs: Vec::new(),
        };
        assert_eq!(
            dispatcher.dispatch(&request, "deye-user").await,
            Err(FulfillmentError::MissingInput)
        );
    }
}

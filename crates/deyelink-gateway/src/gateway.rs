//! Device gateway capability interface

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde_json::Value;

/// Upstream device operations consumed by the fulfillment engine
///
/// Every call may fail; callers fold failures into per-item or per-request
/// errors and never retry.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Raw device listing: a bare array or an object wrapping one
    async fn list_devices(&self) -> GatewayResult<Value>;

    /// Latest status records for a batch of device ids, in one call
    async fn device_status(&self, ids: &[String]) -> GatewayResult<Vec<Value>>;

    /// Log in to the upstream afresh, bypassing any cached session, and
    /// return the new session token
    async fn check_auth(&self) -> GatewayResult<String>;

    /// Set a device's work mode, returning the upstream acknowledgement
    async fn set_mode(&self, id: &str, mode: i64) -> GatewayResult<Value>;
}

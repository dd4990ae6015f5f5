//! Deye Cloud developer API client
//!
//! All calls are `POST` with a JSON body and answer with an envelope
//! `{success, data, ...}`; anything but `success: true` is a rejection.
//! The account token is obtained lazily and cached for 59 of its 60 days.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::DeviceGateway;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How long a cached account token is trusted
pub const TOKEN_VALIDITY_DAYS: u64 = 59;

/// Devices fetched per listing call
const DEVICE_PAGE_SIZE: u32 = 100;

/// Keys under which the status endpoint may wrap its records
const STATUS_LIST_KEYS: &[&str] = &["deviceDataList", "list"];

/// Credentials for the Deye developer API
#[derive(Clone)]
pub struct DeyeCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for DeyeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeyeCredentials")
            .field("app_id", &self.app_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Body of the account token request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountTokenRequest<'a> {
    app_secret: &'a str,
    email: &'a str,
    /// Lowercase hex SHA-256, never the plain password
    password: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    obtained_at: Instant,
    ttl: Duration,
}

impl CachedToken {
    fn fresh(value: String) -> Self {
        Self {
            value,
            obtained_at: Instant::now(),
            ttl: Duration::from_secs(TOKEN_VALIDITY_DAYS * 24 * 60 * 60),
        }
    }

    fn is_valid(&self) -> bool {
        self.obtained_at.elapsed() < self.ttl
    }
}

/// Deye Cloud implementation of [`DeviceGateway`]
pub struct DeyeCloudClient {
    http_client: HttpClient,
    credentials: DeyeCredentials,
    base_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for DeyeCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeyeCloudClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl DeyeCloudClient {
    /// Create a client for the given API base URL
    pub fn new(credentials: DeyeCredentials, base_url: impl Into<String>) -> Self {
        Self::with_http_client(HttpClient::new(), credentials, base_url)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_http_client(
        http_client: HttpClient,
        credentials: DeyeCredentials,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// Authenticate against the account endpoint and cache the token
    pub async fn authenticate(&self) -> GatewayResult<String> {
        let mut cached = self.token.write().await;
        let token = self.login().await?;
        *cached = Some(CachedToken::fresh(token.clone()));
        Ok(token)
    }

    async fn login(&self) -> GatewayResult<String> {
        let url = format!("{}/v1.0/account/token", self.base_url);
        let body = AccountTokenRequest {
            app_secret: &self.credentials.app_secret,
            email: &self.credentials.email,
            password: hash_password(&self.credentials.password),
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("appId", self.credentials.app_id.as_str())])
            .json(&body)
            .send()
            .await?;
        let envelope = read_envelope(response).await?;

        let token = success_data(&envelope)
            .and_then(|data| data.get("accessToken"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                warn!("Deye authentication failed: {}", envelope);
                GatewayError::Authentication(envelope.to_string())
            })?;

        info!("Authenticated with Deye Cloud");
        Ok(token)
    }

    /// Return a valid token, authenticating if none is cached or it has lapsed
    ///
    /// The login runs under the write lock; concurrent callers wait for it.
    async fn ensure_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.value.clone());
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.value.clone());
        }
        debug!("No valid Deye token cached, authenticating");
        let token = self.login().await?;
        *cached = Some(CachedToken::fresh(token.clone()));
        Ok(token)
    }

    /// Authenticated POST returning the envelope's `data`
    async fn call(&self, operation: &'static str, path: &str, body: Value) -> GatewayResult<Value> {
        self.send(operation, Method::POST, path, Some(body)).await
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<Value> {
        let token = self.ensure_token().await?;
        let url = format!("{}{}", self.base_url, path);

        debug!("Deye call {} -> {} {}", operation, method, path);
        let mut request = self.http_client.request(method, &url).bearer_auth(token);
        if let Some(body) = &body {
            request = request.json(body);
        }
        let envelope = read_envelope(request.send().await?).await?;

        match success_data(&envelope) {
            Some(data) => Ok(data.clone()),
            None => {
                warn!("Deye {} failed: {}", operation, envelope);
                Err(GatewayError::Rejected {
                    operation,
                    body: envelope.to_string(),
                })
            }
        }
    }

    /// Switch a battery's control mode, returning the upstream order acknowledgement
    pub async fn set_battery_mode(&self, id: &str, mode: i64) -> GatewayResult<Value> {
        self.call(
            "battery mode control",
            "/v1.0/order/battery/modeControl",
            json!({ "deviceSn": id, "mode": mode }),
        )
        .await
    }

    /// Update a device's power limit in watts
    pub async fn set_power_limit(&self, id: &str, power: i64) -> GatewayResult<Value> {
        self.call(
            "power limit update",
            "/v1.0/order/sys/power/update",
            json!({ "deviceSn": id, "power": power }),
        )
        .await
    }

    /// Progress of a previously submitted order
    pub async fn order_status(&self, order_id: &str) -> GatewayResult<Value> {
        let path = format!("/v1.0/order/{}", order_id);
        self.send("order status", Method::GET, &path, None).await
    }
}

#[async_trait]
impl DeviceGateway for DeyeCloudClient {
    async fn list_devices(&self) -> GatewayResult<Value> {
        let data = self
            .call(
                "device list",
                "/v1.0/device/list",
                json!({ "page": 1, "size": DEVICE_PAGE_SIZE }),
            )
            .await?;
        Ok(match data {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        })
    }

    async fn device_status(&self, ids: &[String]) -> GatewayResult<Vec<Value>> {
        let data = self
            .call(
                "device status",
                "/v1.0/device/latest",
                json!({ "deviceSns": ids }),
            )
            .await?;

        match data {
            Value::Null => Ok(Vec::new()),
            Value::Array(records) => Ok(records),
            Value::Object(mut map) => STATUS_LIST_KEYS
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(records)) => Some(records),
                    _ => None,
                })
                .ok_or_else(|| {
                    GatewayError::InvalidResponse("device status is not a list".to_string())
                }),
            other => Err(GatewayError::InvalidResponse(format!(
                "device status is not a list: {}",
                other
            ))),
        }
    }

    async fn check_auth(&self) -> GatewayResult<String> {
        self.authenticate().await
    }

    async fn set_mode(&self, id: &str, mode: i64) -> GatewayResult<Value> {
        self.call(
            "work mode update",
            "/v1.0/order/sys/workMode/update",
            json!({ "deviceSn": id, "mode": mode }),
        )
        .await
    }
}

/// SHA-256 of the password as lowercase hex, the form the account endpoint expects
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn read_envelope(response: reqwest::Response) -> GatewayResult<Value> {
    let status = response.status();
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|_| GatewayError::InvalidResponse(format!("HTTP {}: {}", status, text)))
}

fn success_data(envelope: &Value) -> Option<&Value> {
    if envelope.get("success").and_then(Value::as_bool) == Some(true) {
        Some(envelope.get("data").unwrap_or(&Value::Null))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> DeyeCredentials {
        DeyeCredentials {
            app_id: "app-1".to_string(),
            app_secret: "app-secret".to_string(),
            email: "owner@example.com".to_string(),
            password: String::new(),
        }
    }

    async fn mount_auth(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1.0/account/token"))
            .and(query_param("appId", "app-1"))
            .and(body_partial_json(json!({
                "appSecret": "app-secret",
                "email": "owner@example.com",
                "password": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "accessToken": "deye-token" }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_token_is_cached_across_calls() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/device/list"))
            .and(header("authorization", "Bearer deye-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "list": [{ "deviceSn": "SN1" }] }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let first = client.list_devices().await.unwrap();
        let second = client.list_devices().await.unwrap();
        assert_eq!(first["list"][0]["deviceSn"], "SN1");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/account/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "msg": "bad credentials"
            })))
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        assert!(matches!(
            client.list_devices().await,
            Err(GatewayError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_device_status_sends_batch() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/device/latest"))
            .and(body_partial_json(json!({ "deviceSns": ["A", "B"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{ "deviceSn": "A", "data": { "power": 120 } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let records = client
            .device_status(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["deviceSn"], "A");
    }

    #[tokio::test]
    async fn test_device_status_accepts_wrapped_list() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/device/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "deviceDataList": [{ "deviceSn": "A" }] }
            })))
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let records = client.device_status(&["A".to_string()]).await.unwrap();
        assert_eq!(records[0]["deviceSn"], "A");
    }

    #[tokio::test]
    async fn test_set_mode_rejection() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/order/sys/workMode/update"))
            .and(body_partial_json(json!({ "deviceSn": "SN1", "mode": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "msg": "device offline"
            })))
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let err = client.set_mode("SN1", 1).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Rejected { operation: "work mode update", .. }
        ));
        assert!(err.to_string().contains("device offline"));
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_login() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/device/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": [] }))
                    .set_delay(std::time::Duration::from_millis(20)),
            )
            .expect(8)
            .mount(&server)
            .await;

        let client = std::sync::Arc::new(DeyeCloudClient::new(credentials(), server.uri()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.list_devices().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_check_auth_forces_login() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        assert_eq!(client.check_auth().await.unwrap(), "deye-token");
        assert_eq!(client.check_auth().await.unwrap(), "deye-token");
    }

    #[tokio::test]
    async fn test_battery_and_power_orders() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/order/battery/modeControl"))
            .and(body_partial_json(json!({ "deviceSn": "SN1", "mode": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "orderId": 11 }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1.0/order/sys/power/update"))
            .and(body_partial_json(json!({ "deviceSn": "SN1", "power": 3000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "orderId": 12 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let battery = client.set_battery_mode("SN1", 2).await.unwrap();
        let power = client.set_power_limit("SN1", 3000).await.unwrap();
        assert_eq!(battery["orderId"], 11);
        assert_eq!(power["orderId"], 12);
    }

    #[tokio::test]
    async fn test_order_status_uses_get() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1.0/order/12"))
            .and(header("authorization", "Bearer deye-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "orderId": 12, "status": "SUCCESS" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/order/13"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "msg": "order not found"
            })))
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        let status = client.order_status("12").await.unwrap();
        assert_eq!(status["status"], "SUCCESS");
        assert!(matches!(
            client.order_status("13").await,
            Err(GatewayError::Rejected { operation: "order status", .. })
        ));
    }

    #[tokio::test]
    async fn test_non_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/account/token"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let client = DeyeCloudClient::new(credentials(), server.uri());
        assert!(matches!(
            client.authenticate().await,
            Err(GatewayError::InvalidResponse(_))
        ));
    }
}

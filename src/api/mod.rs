use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

/// Simplified connection state derived from the gateway status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Instance is connected and logged in.
    Connected,
    /// Instance is not fully connected.
    Disconnected,
}

impl ConnectionState {
    /// Stable string representation of a connection state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Result of creating a new instance.
#[derive(Debug, Clone)]
pub struct CreatedInstance {
    /// Bearer credential issued for the new instance.
    pub token: String,
}

/// QR payload returned by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QrPayload {
    /// Image payload (data URI or base64) for scanning.
    pub qr_base64: String,
    /// Raw session reference encoded in the QR.
    pub code: String,
}

/// Client contract for the instance operations consumed by the wizard and
/// the dashboard.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, ApiError>;
    async fn connection_status(&self, token: &str) -> Result<ConnectionState, ApiError>;
    async fn fetch_qr(&self, token: &str) -> Result<QrPayload, ApiError>;
    async fn pair_phone(&self, token: &str, phone: &str) -> Result<Value, ApiError>;
    async fn disconnect(&self, token: &str) -> Result<(), ApiError>;
    async fn logout(&self, token: &str) -> Result<(), ApiError>;
}

/// Errors from the instance API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// HTTP client for the local proxy surface, authenticating with a bearer
/// token.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client targeting the proxy's base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/api{path}", self.base_url);
        let mut request = self.http.request(method, &url);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload = response.json::<Value>().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| payload.get("error").and_then(Value::as_str))
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(payload)
    }
}

#[async_trait]
impl InstanceApi for HttpApiClient {
    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, ApiError> {
        let payload = self
            .request(
                reqwest::Method::POST,
                "/instance/create",
                None,
                Some(json!({ "name": name })),
            )
            .await?;

        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Decode("create response missing token".to_owned()))?;

        Ok(CreatedInstance {
            token: token.to_owned(),
        })
    }

    async fn connection_status(&self, token: &str) -> Result<ConnectionState, ApiError> {
        let payload = self
            .request(reqwest::Method::GET, "/instance/status", Some(token), None)
            .await?;

        // Both flags must be set; anything missing counts as disconnected.
        let data = payload.get("data");
        let connected = flag(data, "Connected") && flag(data, "LoggedIn");

        Ok(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        })
    }

    async fn fetch_qr(&self, token: &str) -> Result<QrPayload, ApiError> {
        let payload = self
            .request(reqwest::Method::GET, "/instance/qr", Some(token), None)
            .await?;

        let data = payload.get("data");
        Ok(QrPayload {
            qr_base64: string_field(data, "Qrcode"),
            code: string_field(data, "Code"),
        })
    }

    async fn pair_phone(&self, token: &str, phone: &str) -> Result<Value, ApiError> {
        self.request(
            reqwest::Method::POST,
            "/instance/pair",
            Some(token),
            Some(json!({ "phone": phone })),
        )
        .await
    }

    async fn disconnect(&self, token: &str) -> Result<(), ApiError> {
        self.request(
            reqwest::Method::POST,
            "/instance/disconnect",
            Some(token),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.request(
            reqwest::Method::DELETE,
            "/instance/logout",
            Some(token),
            None,
        )
        .await
        .map(|_| ())
    }
}

fn flag(data: Option<&Value>, key: &str) -> bool {
    data.and_then(|data| data.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn string_field(data: Option<&Value>, key: &str) -> String {
    data.and_then(|data| data.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

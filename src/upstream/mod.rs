use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// HTTP client for the upstream Evolution API.
///
/// Requests carry the caller's key in the `Apikey` header; the response
/// status and JSON body are passed through to the local surface untouched.
pub struct EvolutionClient {
    http: reqwest::Client,
    base_url: String,
}

/// Status and body of a forwarded upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl EvolutionClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client targeting the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Forwards a request to the upstream gateway.
    pub async fn forward(
        &self,
        method: reqwest::Method,
        path: &str,
        api_key: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Apikey", api_key);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(UpstreamError::Request)?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let body = response
            .json::<Value>()
            .await
            .map_err(UpstreamError::Decode)?;

        Ok(UpstreamResponse { status, body })
    }
}

/// Errors from upstream forwarding.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("upstream returned a non-json body: {0}")]
    Decode(#[source] reqwest::Error),
}

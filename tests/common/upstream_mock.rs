#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

/// One request observed by the mock gateway.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub apikey: String,
    pub body: Value,
}

/// Shared recorder for the mock gateway.
#[derive(Clone, Default)]
pub struct MockUpstream {
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Starts a mock Evolution API server on an ephemeral port and returns its
/// base URL plus the request recorder.
pub async fn start_mock_upstream() -> (String, MockUpstream) {
    let mock = MockUpstream::default();
    let app = Router::new()
        .fallback(record_and_respond)
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (url, mock)
}

async fn record_and_respond(
    State(mock): State<MockUpstream>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_owned();
    let apikey = headers
        .get("apikey")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    mock.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        apikey: apikey.clone(),
        body: parsed.clone(),
    });

    if apikey == "bad-key" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid API key" })),
        )
            .into_response();
    }

    let (status, payload) = match path.as_str() {
        "/instance/create" => (
            StatusCode::CREATED,
            json!({
                "instance": { "name": parsed.get("name").cloned().unwrap_or(Value::Null) },
                "status": "created",
            }),
        ),
        "/instance/status" => (
            StatusCode::OK,
            json!({ "data": { "Connected": true, "LoggedIn": false } }),
        ),
        "/instance/qr" => (
            StatusCode::OK,
            json!({ "data": { "Qrcode": "data:image/png;base64,AAA", "Code": "2@ref" } }),
        ),
        "/instance/pair" => (
            StatusCode::OK,
            json!({ "data": { "PairingCode": "ABCD-1234" }, "message": "ok" }),
        ),
        "/instance/disconnect" | "/instance/logout" => {
            (StatusCode::OK, json!({ "status": "ok" }))
        }
        _ => (StatusCode::NOT_FOUND, json!({ "error": "unknown path" })),
    };

    (status, Json(payload)).into_response()
}

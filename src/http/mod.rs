pub mod guards;

use std::path::Path;

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{errors::AppError, state::AppState};

/// Builds the root HTTP router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/instance/create", post(create_instance_handler))
        .route("/instance/status", get(status_handler))
        .route("/instance/qr", get(qr_handler))
        .route("/instance/pair", post(pair_handler))
        .route("/instance/disconnect", post(disconnect_handler))
        .route("/instance/logout", delete(logout_handler));

    let router = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer());

    // Serve the dashboard bundle with SPA index fallback when configured.
    let router = match &state.config.static_dir {
        Some(dir) => {
            let index = Path::new(dir).join("index.html");
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => router,
    };

    router.with_state(state)
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct CreateInstanceRequest {
    name: String,
}

async fn create_instance_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateInstanceRequest>,
) -> Result<Response, AppError> {
    let token = Uuid::new_v4().to_string();
    let body = json!({ "name": request.name, "token": token });
    tracing::info!(name = %request.name, "creating instance");

    let response = state
        .upstream
        .forward(
            Method::POST,
            "/instance/create",
            &state.config.master_api_key,
            Some(&body),
        )
        .await
        .map_err(|error| AppError::upstream("Failed to create instance", error))?;

    // The generated token rides along with the upstream echo so the client
    // can store it as its credential.
    let payload = match response.body {
        Value::Object(mut fields) => {
            fields.insert("token".to_owned(), Value::String(token));
            Value::Object(fields)
        }
        _ => json!({ "token": token }),
    };

    Ok((response.status, Json(payload)).into_response())
}

async fn status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = guards::bearer_token(&headers)?;

    let response = state
        .upstream
        .forward(Method::GET, "/instance/status", &token, None)
        .await
        .map_err(|error| AppError::upstream("Failed to get status", error))?;

    Ok((response.status, Json(response.body)).into_response())
}

async fn qr_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = guards::bearer_token(&headers)?;

    let response = state
        .upstream
        .forward(Method::GET, "/instance/qr", &token, None)
        .await
        .map_err(|error| AppError::upstream("Failed to get QR code", error))?;

    Ok((response.status, Json(response.body)).into_response())
}

async fn pair_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let token = guards::bearer_token(&headers)?;
    tracing::debug!(body = %body, "pair request");

    let response = state
        .upstream
        .forward(Method::POST, "/instance/pair", &token, Some(&body))
        .await
        .map_err(|error| AppError::upstream("Failed to pair instance", error))?;

    Ok((response.status, Json(response.body)).into_response())
}

async fn disconnect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = guards::bearer_token(&headers)?;

    let response = state
        .upstream
        .forward(Method::POST, "/instance/disconnect", &token, None)
        .await
        .map_err(|error| AppError::upstream("Failed to disconnect instance", error))?;

    Ok((response.status, Json(response.body)).into_response())
}

async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = guards::bearer_token(&headers)?;

    let response = state
        .upstream
        .forward(Method::DELETE, "/instance/logout", &token, None)
        .await
        .map_err(|error| AppError::upstream("Failed to logout instance", error))?;

    Ok((response.status, Json(response.body)).into_response())
}

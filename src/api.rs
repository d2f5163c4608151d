//! HTTP API server for the WhatsApp bridge.
//!
//! Every route is served twice: under a short path (`/status`) and under the
//! `/api/*` alias (`/api/status`). Both point at the same handlers.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use wabridge_channels::{qr, ConnectionManager};
use wabridge_core::config::ApiConfig;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    manager: ConnectionManager,
    api_key: Option<String>,
    uptime: Instant,
}

impl ApiState {
    /// An empty `api_key` disables auth.
    pub fn new(manager: ConnectionManager, api_key: &str) -> Self {
        Self {
            manager,
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            uptime: Instant::now(),
        }
    }
}

/// `POST /send` request body. Fields are optional so a missing one is a 400
/// with our own message instead of a deserialization error.
#[derive(Debug, Deserialize)]
struct SendRequest {
    to: Option<String>,
    message: Option<String>,
}

/// Constant-time string comparison to prevent timing attacks on API token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<ApiError> {
    let key = api_key.as_ref()?;

    let Some(header) = headers.get("authorization") else {
        return Some(unauthorized("missing Authorization header"));
    };
    let Ok(value) = header.to_str() else {
        return Some(unauthorized("invalid Authorization header"));
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some(unauthorized("invalid token")),
    }
}

fn unauthorized(reason: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": reason})))
}

fn failure(status: StatusCode, error: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(json!({"success": false, "error": error.to_string()})),
    )
}

/// `POST /connect`: open the WhatsApp session (no-op if one is live).
async fn connect(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    state.manager.connect().await.map_err(|e| {
        error!("connection error: {e}");
        failure(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "WhatsApp connection initiated",
    })))
}

/// `POST /logout`: close the session and wipe its credentials.
async fn logout(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    state.manager.logout().await.map_err(|e| {
        error!("logout error: {e}");
        failure(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out, session removed",
    })))
}

/// `GET /status`: connection flag, pending QR payload, lifecycle state, and
/// the linked account once open.
async fn status(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let status = state.manager.status().await;
    serde_json::to_value(status)
        .map(Json)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e))
}

async fn current_qr(state: &ApiState) -> Result<String, ApiError> {
    state.manager.pairing_code().await.ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({"error": "QR code not available"})),
    ))
}

/// `GET /qr`: raw pairing payload, 404 when none is pending.
async fn qr_code(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let qr = current_qr(&state).await?;
    Ok(Json(json!({ "qr": qr })))
}

/// `GET /qr/image`: pairing payload as a base64 PNG.
async fn qr_image(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let qr = current_qr(&state).await?;
    let png_bytes = qr::render_png(&qr).map_err(|e| {
        error!("QR image generation failed: {e}");
        failure(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    Ok(Json(json!({ "qr_png_base64": BASE64.encode(&png_bytes) })))
}

/// `POST /send`: send a text message to `to` (`+` and country code).
async fn send(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let Json(request) =
        body.map_err(|e| failure(StatusCode::BAD_REQUEST, format!("invalid request: {e}")))?;

    let (to, message) = match (request.to, request.message) {
        (Some(to), Some(message)) if !to.trim().is_empty() && !message.is_empty() => {
            (to, message)
        }
        _ => {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                "to and message are required",
            ))
        }
    };

    let outcome = state.manager.send_text(to.trim(), &message).await.map_err(|e| {
        error!("message sending error: {e}");
        failure(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    serde_json::to_value(outcome)
        .map(Json)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e))
}

/// `GET /health`: liveness with uptime and WhatsApp state.
async fn health(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "whatsapp": state.manager.state().await.as_str(),
        "transport": state.manager.transport_name(),
    })))
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/connect", post(connect))
        .route("/api/connect", post(connect))
        .route("/logout", post(logout))
        .route("/api/logout", post(logout))
        .route("/status", get(status))
        .route("/api/status", get(status))
        .route("/qr", get(qr_code))
        .route("/api/qr-code", get(qr_code))
        .route("/qr/image", get(qr_image))
        .route("/api/qr-code/image", get(qr_image))
        .route("/send", post(send))
        .route("/api/send-message", post(send))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &ApiConfig,
    manager: ConnectionManager,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(ApiState::new(manager, &config.api_key));
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("API server failed to bind to {addr}: {e}"))?;

    info!("API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server stopped");
    Ok(())
}

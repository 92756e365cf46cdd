//! Gateway HTTP server: the client-facing `/api/*` surface in front of the backend.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;

use super::backend::{FormField, ServerApi};

/// Field name the backend expects file parts under.
const UPLOAD_FILE_FIELD: &str = "file";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub api: ServerApi,
}

impl GatewayState {
    pub fn new(config: Config) -> Self {
        let api = ServerApi::from_config(&config);
        Self {
            config: Arc::new(config),
            api,
        }
    }
}

/// Routes: `GET /` health, `POST /api/chat`, `POST /api/upload`.
pub fn router(state: GatewayState) -> Router {
    let body_limit = state.config.gateway.max_body_bytes;
    Router::new()
        .route("/", get(health_http))
        .route("/api/chat", post(chat))
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = GatewayState::new(config);
    let bind_addr = format!(
        "{}:{}",
        state.config.gateway.bind.trim(),
        state.config.gateway.port
    );
    log::info!("forwarding to backend at {}", state.api.root());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

/// POST /api/chat: forward the JSON body to `/chat`. An unreadable body is sent as `{}`.
/// Failed responses are reduced to `{ "error": message }`.
async fn chat(State(state): State<GatewayState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    match state.api.post_json(&headers, "/chat", &payload).await {
        Ok(res) if res.status.is_success() => (res.status, Json(res.data)).into_response(),
        Ok(res) => {
            let message = upstream_error(&res.data, res.status);
            log::debug!("chat: backend returned {}: {}", res.status, message);
            (res.status, Json(json!({ "error": message }))).into_response()
        }
        Err(e) => {
            log::warn!("chat: forwarding failed: {}", e);
            internal_error(e.to_string())
        }
    }
}

/// POST /api/upload: re-encode the inbound form and forward it to `/upload`.
/// File parts are sent as `file` whatever they were named inbound; text fields keep their names.
async fn upload(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut fields = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("failed to read multipart: {}", e)),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return bad_request(format!("failed to read field {:?}: {}", name, e)),
        };
        fields.push(if file_name.is_some() {
            FormField::File {
                name: UPLOAD_FILE_FIELD.to_string(),
                file_name,
                content_type,
                bytes,
            }
        } else {
            FormField::Text {
                name,
                value: String::from_utf8_lossy(&bytes).into_owned(),
            }
        });
    }

    match state.api.post_form(&headers, "/upload", fields).await {
        Ok(res) => {
            log::info!("upload: backend returned {}", res.status);
            (res.status, Json(res.data)).into_response()
        }
        Err(e) => {
            log::warn!("upload: forwarding failed: {}", e);
            internal_error(e.to_string())
        }
    }
}

/// Message for a failed backend response: its `error`, `detail`, or `message` field, else the status.
fn upstream_error(data: &Value, status: StatusCode) -> String {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| match data.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | Some(Value::String(_)) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(|| format!("backend returned {}", status.as_u16()))
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

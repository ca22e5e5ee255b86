use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};

use regroup_core::{Embedder, RegroupConfig, RegroupError, Regrouper, TablePayload};

pub struct AppState {
    regrouper: Regrouper<Box<dyn Embedder>>,
}

impl AppState {
    pub fn new(embedder: Box<dyn Embedder>, config: RegroupConfig) -> Result<Self, RegroupError> {
        Ok(Self {
            regrouper: Regrouper::new(embedder, config)?,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/regroup", post(handle_regroup))
        .route("/invoke", post(handle_invoke))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct RegroupParams {
    #[serde(default)]
    base64: bool,
}

/// Function-gateway style event wrapping the payload.
#[derive(Debug, Deserialize)]
pub struct InvokeEvent {
    #[serde(default)]
    body: Option<String>,
    #[serde(default, rename = "isBase64Encoded")]
    is_base64_encoded: bool,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    body: String,
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_regroup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegroupParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TablePayload>, AppError> {
    let encoded = params.base64 || declares_base64(&headers);
    let payload = decode_payload(&body, encoded)?;
    let result = run_regroup(state, payload).await?;
    Ok(Json(result))
}

async fn handle_invoke(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InvokeEvent>,
) -> Json<InvokeResponse> {
    let raw = event.body.unwrap_or_default();
    let outcome = match decode_payload(raw.as_bytes(), event.is_base64_encoded) {
        Ok(payload) => run_regroup(state, payload).await,
        Err(err) => Err(err),
    };
    let response = match outcome {
        Ok(payload) => match serde_json::to_string(&payload) {
            Ok(body) => InvokeResponse {
                status_code: StatusCode::OK.as_u16(),
                body,
            },
            Err(err) => error_envelope(AppError::internal(err)),
        },
        Err(err) => error_envelope(err),
    };
    Json(response)
}

fn error_envelope(err: AppError) -> InvokeResponse {
    let (status, message) = err.status_and_message();
    InvokeResponse {
        status_code: status.as_u16(),
        body: json!({ "error": message }).to_string(),
    }
}

async fn run_regroup(state: Arc<AppState>, payload: TablePayload) -> Result<TablePayload, AppError> {
    let rows = payload.tables.first().map(|t| t.row_count()).unwrap_or(0);
    info!(rows, "regroup request");
    task::spawn_blocking(move || state.regrouper.regroup_payload(payload))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

fn declares_base64(headers: &HeaderMap) -> bool {
    headers
        .get("content-transfer-encoding")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().eq_ignore_ascii_case("base64"))
        .unwrap_or(false)
}

/// Decodes the request body, base64 first when the caller says so.
pub fn decode_payload(body: &[u8], base64: bool) -> Result<TablePayload, AppError> {
    let decoded;
    let bytes = if base64 {
        let trimmed: Vec<u8> = body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        decoded = general_purpose::STANDARD.decode(trimmed).map_err(|err| {
            warn!("base64 decode failed: {err}");
            AppError::bad_request("Failed to decode request body")
        })?;
        decoded.as_slice()
    } else {
        body
    };
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AppError::bad_request("Failed to decode request body"))?;
    serde_json::from_str(text)
        .map_err(|err| AppError::bad_request(format!("invalid table payload: {err}")))
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Regroup(#[from] RegroupError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Regroup(err) => match err {
                RegroupError::MalformedTable(_) | RegroupError::InsufficientData(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
                }
                RegroupError::EmbeddingService(_) => {
                    error!("embedding_error" = %err);
                    (StatusCode::BAD_GATEWAY, "embedding service unavailable".to_string())
                }
                RegroupError::Json(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                RegroupError::Consistency(_) | RegroupError::Config(_) => {
                    error!("internal_error" = %err, kind = err.kind());
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
            },
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

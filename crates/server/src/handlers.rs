use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use pooler_core::{Coordinator, MonitorStats, WorkStatusSnapshot};
use pooler_primitives::{Entropy, PlantedFarmer, PlantingNotification};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::LOG_TARGET;

/// Shared application state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub stats: std::sync::Arc<MonitorStats>,
    pub auth_token: String,
    pub max_error_count: u32,
}

/// The Backend emits block indices as numbers or strings depending on the
/// codepath; fold both.
fn de_block_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Nested `block_data` carrier; only the fields the pooler needs.
#[derive(Debug, Default, Deserialize)]
struct BlockDataFields {
    #[serde(default)]
    entropy: Option<String>,

    #[serde(default, alias = "blockTimestamp", alias = "timestamp")]
    block_timestamp: Option<u64>,
}

/// `POST /backend/planting-status` body. Every field is accepted in both
/// snake_case and camelCase.
#[derive(Debug, Deserialize)]
pub struct PlantingStatusRequest {
    #[serde(alias = "blockIndex", deserialize_with = "de_block_index")]
    block_index: u32,

    #[serde(alias = "poolerId")]
    #[allow(dead_code)]
    pooler_id: String,

    #[serde(alias = "successfulPlants")]
    successful_plants: u32,

    #[serde(alias = "failedPlants")]
    failed_plants: u32,

    #[serde(default, alias = "plantedFarmers")]
    planted_farmers: Vec<PlantedFarmer>,

    #[serde(default, alias = "blockData")]
    block_data: Option<BlockDataFields>,

    #[serde(default, alias = "blockTimestamp")]
    block_timestamp: Option<u64>,
}

/// `POST /backend/planted-farmers` body: a direct planting notification.
#[derive(Debug, Deserialize)]
pub struct PlantedFarmersRequest {
    #[serde(alias = "blockIndex", deserialize_with = "de_block_index")]
    block_index: u32,

    #[serde(default)]
    entropy: Option<String>,

    #[serde(default, alias = "blockData")]
    block_data: Option<BlockDataFields>,

    #[serde(default, alias = "blockTimestamp")]
    block_timestamp: Option<u64>,

    #[serde(default, alias = "plantedFarmers")]
    planted_farmers: Vec<PlantedFarmer>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing bearer token")]
    Unauthorized,

    #[error("bearer token mismatch")]
    Forbidden,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Handler for `POST /backend/planting-status`.
///
/// The Backend is trusted: malformed-but-parseable notifications are
/// logged and acknowledged with 200 without scheduling anything.
pub async fn planting_status(
    State(state): State<AppState>,
    Json(request): Json<PlantingStatusRequest>,
) -> Json<Value> {
    info!(
        target: LOG_TARGET,
        block = request.block_index,
        successful = request.successful_plants,
        failed = request.failed_plants,
        farmers = request.planted_farmers.len(),
        "Planting status received."
    );

    let entropy = request.block_data.as_ref().and_then(|data| data.entropy.clone());
    let block_timestamp = request
        .block_timestamp
        .or_else(|| request.block_data.as_ref().and_then(|data| data.block_timestamp));

    let scheduled = schedule(
        &state,
        request.block_index,
        entropy,
        block_timestamp,
        request.planted_farmers,
    );

    Json(json!({ "received": true, "scheduled": scheduled, "blockIndex": request.block_index }))
}

/// Handler for `POST /backend/planted-farmers`. Requires the configured
/// bearer token, matched exactly.
pub async fn planted_farmers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PlantedFarmersRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if token != format!("Bearer {}", state.auth_token) {
        return Err(ApiError::Forbidden);
    }

    let entropy = request
        .entropy
        .or_else(|| request.block_data.as_ref().and_then(|data| data.entropy.clone()));
    let block_timestamp = request
        .block_timestamp
        .or_else(|| request.block_data.as_ref().and_then(|data| data.block_timestamp));

    let scheduled = schedule(
        &state,
        request.block_index,
        entropy,
        block_timestamp,
        request.planted_farmers,
    );

    Ok(Json(json!({
        "received": true,
        "scheduled": scheduled,
        "blockIndex": request.block_index
    })))
}

/// Translates an inbound request into a normalized notification and hands
/// it to the coordinator. Returns whether scheduling actually happened.
fn schedule(
    state: &AppState,
    block_index: u32,
    entropy: Option<String>,
    block_timestamp: Option<u64>,
    farmers: Vec<PlantedFarmer>,
) -> bool {
    if farmers.is_empty() {
        info!(target: LOG_TARGET, block = block_index, "No planted farmers, nothing to schedule.");
        return false;
    }

    let Some(entropy_hex) = entropy else {
        warn!(target: LOG_TARGET, block = block_index, "Notification carries no entropy.");
        return false;
    };

    let entropy = match Entropy::from_hex(&entropy_hex) {
        Ok(entropy) => entropy,
        Err(err) => {
            warn!(target: LOG_TARGET, block = block_index, %err, "Bad entropy in notification.");
            return false;
        }
    };

    let block_timestamp = block_timestamp.unwrap_or_else(|| {
        warn!(
            target: LOG_TARGET,
            block = block_index,
            "Notification carries no block timestamp, scheduling relative to now."
        );
        Utc::now().timestamp().max(0) as u64
    });

    state.coordinator.handle_notification(PlantingNotification {
        block_index,
        entropy,
        block_timestamp,
        farmers,
    });
    true
}

/// Handler for `GET /health`: 200 while the monitor runs below its error
/// ceiling, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let healthy = state.stats.is_healthy(state.max_error_count);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = json!({
        "healthy": healthy,
        "monitor": state.stats.state().as_str(),
        "uptimeMs": state.stats.uptime_ms(),
        "startedAt": state.stats.started_at().to_rfc3339(),
        "totalBlocksDiscovered": state.stats.total_blocks_discovered(),
        "consecutiveErrors": state.stats.consecutive_errors(),
        "lastBlockTimestamp": state.stats.last_block_timestamp(),
        "lastNotificationAt": state.stats.last_notification().map(|at| at.to_rfc3339()),
    });

    (status, Json(body)).into_response()
}

/// Handler for `GET /status/work`.
pub async fn work_status(State(state): State<AppState>) -> Json<WorkStatusSnapshot> {
    Json(state.coordinator.status())
}

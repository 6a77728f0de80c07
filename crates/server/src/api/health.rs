//! Welcome and health endpoints.

use std::sync::Arc;

use adu_queue::QueueHealth;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

use super::success;

pub async fn welcome() -> Json<Value> {
    success(serde_json::json!({ "message": "Welcome" }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: String,
    pub queue: Option<QueueHealth>,
    pub systems: usize,
    pub config: Value,
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.store.health_check().await;
    let queue = state.queue.health_check().await;
    let healthy = store.is_ok() && queue.as_ref().map(|q| q.connected).unwrap_or(false);

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store: match store {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        },
        queue: queue.ok(),
        systems: state.registry.len(),
        config: state.config.redacted_summary(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

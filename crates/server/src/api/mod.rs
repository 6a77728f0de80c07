//! Intake HTTP endpoints.
//!
//! Bodies follow the JSend envelope: `{"status":"success","data":...}` or
//! `{"status":"error","message":...}`.

mod health;
mod submissions;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

// ── JSend helpers ────────────────────────────────────────────────

pub(crate) fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

pub(crate) fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "status": "error", "message": message.into() }))
}

pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, error_body("404 - Not Found"))
}

// ── Re-exports ───────────────────────────────────────────────────

pub use health::{health, welcome};
pub use submissions::create_submission;

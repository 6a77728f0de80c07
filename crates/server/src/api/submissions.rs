use std::sync::Arc;

use adu_core::SubmissionId;
use adu_queue::JobHandle;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::intake::{check_access_key, handle_submission, IntakeError, ACCESS_KEY_HEADER};
use crate::state::AppState;

use super::{error_body, success};

#[derive(Serialize)]
pub struct SubmissionCreated {
    pub submission_id: SubmissionId,
    pub job_ids: Vec<JobHandle>,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        (self.status_code(), error_body(self.to_string())).into_response()
    }
}

/// POST /submissions
pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, IntakeError> {
    let provided = headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    check_access_key(state.config.server.access_key.as_deref(), provided)?;

    let Json(payload) = body.map_err(|_| IntakeError::NotAnObject)?;
    let accepted = handle_submission(&state, payload).await?;

    Ok(success(SubmissionCreated {
        submission_id: accepted.submission.id,
        job_ids: accepted.jobs.into_iter().map(|j| j.handle).collect(),
    }))
}

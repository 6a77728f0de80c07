//! Intake: validate, persist, schedule.
//!
//! The request only waits for the initial `schedule()` call to enqueue jobs.
//! If persisting or scheduling fails after the row exists, the row is deleted
//! before the error reaches the caller.

use adu_core::{Submission, SubmissionData};
use adu_dispatch::ScheduledJob;
use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::state::AppState;

/// Request header carrying the shared intake secret.
pub const ACCESS_KEY_HEADER: &str = "access_key";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("missing required keys: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("invalid or missing access key")]
    Forbidden,

    #[error("submission could not be processed: {0}")]
    Persistence(String),
}

impl IntakeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::NotAnObject => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A persisted submission and the jobs its first scheduling pass enqueued.
#[derive(Debug)]
pub struct Accepted {
    pub submission: Submission,
    pub jobs: Vec<ScheduledJob>,
}

/// Reject the request unless `provided` matches the configured key.
/// With no key configured every request is rejected.
pub fn check_access_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), IntakeError> {
    match (expected, provided) {
        (Some(expected), Some(provided))
            if !expected.is_empty() && keys_match(expected.as_bytes(), provided.as_bytes()) =>
        {
            Ok(())
        }
        (None, _) => {
            warn!("ACCESS_KEY is not configured; rejecting intake request");
            Err(IntakeError::Forbidden)
        }
        _ => Err(IntakeError::Forbidden),
    }
}

/// Compare without short-circuiting on the first differing byte, so timing
/// only reveals whether the lengths differ.
fn keys_match(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

pub async fn handle_submission(state: &AppState, payload: Value) -> Result<Accepted, IntakeError> {
    let Value::Object(data) = payload else {
        return Err(IntakeError::NotAnObject);
    };
    validate(&data, &state.config.dispatch.required_keys)?;

    let submission = state.store.create_submission(data).await.map_err(|e| {
        error!(error = %e, "failed to persist submission");
        IntakeError::Persistence(e.to_string())
    })?;

    match state.scheduler.schedule(&submission, &state.registry).await {
        Ok(jobs) => {
            info!(
                submission_id = submission.id,
                jobs = jobs.len(),
                "submission accepted"
            );
            Ok(Accepted { submission, jobs })
        }
        Err(e) => {
            error!(submission_id = submission.id, error = %e, "initial scheduling failed, rolling back");
            if let Err(delete_err) = state.store.delete_submission(submission.id).await {
                error!(
                    submission_id = submission.id,
                    error = %delete_err,
                    "rollback failed; submission row left behind"
                );
            }
            Err(IntakeError::Persistence(e.to_string()))
        }
    }
}

fn validate(data: &SubmissionData, required: &[String]) -> Result<(), IntakeError> {
    let missing = Submission::missing_keys(data, required);
    if missing.is_empty() {
        return Ok(());
    }
    info!(missing = ?missing, "rejecting submission with missing keys");
    Err(IntakeError::Validation(
        missing.into_iter().map(str::to_string).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_key_must_match() {
        assert!(check_access_key(Some("k"), Some("k")).is_ok());
        assert!(matches!(
            check_access_key(Some("k"), Some("x")),
            Err(IntakeError::Forbidden)
        ));
        assert!(matches!(
            check_access_key(Some("k"), None),
            Err(IntakeError::Forbidden)
        ));
    }

    #[test]
    fn key_comparison_checks_every_byte() {
        assert!(keys_match(b"s3cret", b"s3cret"));
        assert!(!keys_match(b"s3cret", b"s3cres"));
        assert!(!keys_match(b"s3cret", b"x3cret"));
        assert!(!keys_match(b"s3cret", b"s3cret "));
        assert!(!keys_match(b"s3cret", b""));
        assert!(check_access_key(Some("s3cret"), Some("s3creT")).is_err());
    }

    #[test]
    fn unset_access_key_rejects_everything() {
        assert!(check_access_key(None, Some("anything")).is_err());
        assert!(check_access_key(Some(""), Some("")).is_err());
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            IntakeError::Validation(vec!["block".into()]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(IntakeError::NotAnObject.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(IntakeError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            IntakeError::Persistence("db".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_message_lists_keys() {
        let err = IntakeError::Validation(vec!["block".into(), "lot".into()]);
        assert_eq!(err.to_string(), "missing required keys: block, lot");
    }
}

//! Persistence boundary for submissions and external dispatch records.

use adu_core::{ExternalDispatchRecord, Submission, SubmissionData, SubmissionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("submission not found: {0}")]
    NotFound(SubmissionId),

    #[error("database error: {0}")]
    Backend(String),
}

/// Result of persisting an external dispatch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded(ExternalDispatchRecord),
    /// A record for `(submission, system)` already existed. Another dispatch won the race.
    AlreadyRecorded,
}

// ── Trait ────────────────────────────────────────────────────────────

/// Storage for submissions and the external ids they collect.
///
/// `record_external_dispatch` must enforce at most one record per
/// `(submission_id, system_code)` and report a duplicate as
/// [`RecordOutcome::AlreadyRecorded`] rather than an error.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create_submission(&self, data: SubmissionData) -> Result<Submission, StoreError>;

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// All submissions, oldest first.
    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError>;

    /// Removes the submission and its records. Only used for intake rollback.
    async fn delete_submission(&self, id: SubmissionId) -> Result<(), StoreError>;

    async fn record_external_dispatch(
        &self,
        submission_id: SubmissionId,
        system_code: &str,
        external_id: &str,
    ) -> Result<RecordOutcome, StoreError>;

    async fn find_external_records_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<ExternalDispatchRecord>, StoreError>;

    /// Submissions whose `csv_exported_at` is still unset, oldest first.
    async fn find_submissions_pending_csv_export(&self) -> Result<Vec<Submission>, StoreError>;

    /// Set `csv_exported_at` on every listed submission that has not been exported yet.
    /// Returns the number of rows changed.
    async fn mark_csv_exported(
        &self,
        ids: &[SubmissionId],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

//! PostgreSQL-backed [`SubmissionStore`].
//!
//! Tables `submission` and `external_id` are created by the migrations in
//! `migrations/`. The unique constraint on `(submission_id, external_system)`
//! turns a concurrent duplicate dispatch into `RecordOutcome::AlreadyRecorded`.

use adu_core::{ExternalDispatchRecord, Submission, SubmissionData, SubmissionId};
use adu_dispatch::{RecordOutcome, StoreError, SubmissionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{error, warn};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

// ── Row types ────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    data: Json<Value>,
    date_created: DateTime<Utc>,
    csv_date_processed: Option<DateTime<Utc>>,
}

impl From<SubmissionRow> for Submission {
    fn from(row: SubmissionRow) -> Self {
        let data = match row.data.0 {
            Value::Object(map) => map,
            other => {
                warn!(submission_id = row.id, kind = %json_kind(&other), "submission data is not an object");
                SubmissionData::new()
            }
        };
        Submission {
            id: row.id,
            data,
            created_at: row.date_created,
            csv_exported_at: row.csv_date_processed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExternalIdRow {
    id: i64,
    submission_id: i64,
    external_system: String,
    external_id: String,
    date_created: DateTime<Utc>,
}

impl From<ExternalIdRow> for ExternalDispatchRecord {
    fn from(row: ExternalIdRow) -> Self {
        ExternalDispatchRecord {
            id: row.id,
            submission_id: row.submission_id,
            system_code: row.external_system,
            external_id: row.external_id,
            created_at: row.date_created,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SUBMISSION_COLUMNS: &str = "id, data, date_created, csv_date_processed";

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create_submission(&self, data: SubmissionData) -> Result<Submission, StoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submission (data) VALUES ($1) RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(Json(Value::Object(data)))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_submission(&self, id: SubmissionId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM submission WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn record_external_dispatch(
        &self,
        submission_id: SubmissionId,
        system_code: &str,
        external_id: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let result = sqlx::query_as::<_, ExternalIdRow>(
            "INSERT INTO external_id (submission_id, external_system, external_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (submission_id, external_system) DO NOTHING
             RETURNING id, submission_id, external_system, external_id, date_created",
        )
        .bind(submission_id)
        .bind(system_code)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(RecordOutcome::Recorded(row.into())),
            Ok(None) => Ok(RecordOutcome::AlreadyRecorded),
            Err(e) => map_record_error(e, submission_id),
        }
    }

    async fn find_external_records_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<ExternalDispatchRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExternalIdRow>(
            "SELECT id, submission_id, external_system, external_id, date_created
             FROM external_id
             WHERE submission_id = $1
             ORDER BY id",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_submissions_pending_csv_export(&self) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission
             WHERE csv_date_processed IS NULL
             ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_csv_exported(
        &self,
        ids: &[SubmissionId],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE submission SET csv_date_processed = $1
             WHERE id = ANY($2) AND csv_date_processed IS NULL",
        )
        .bind(at)
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    error!("submission store database error: {}", e);
    StoreError::Backend(e.to_string())
}

fn map_record_error(
    e: sqlx::Error,
    submission_id: SubmissionId,
) -> Result<RecordOutcome, StoreError> {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return Ok(RecordOutcome::AlreadyRecorded),
            Some(FOREIGN_KEY_VIOLATION) => return Err(StoreError::NotFound(submission_id)),
            _ => {}
        }
    }
    Err(db_error(e))
}

// ── Tests ────────────────────────────────────────────────────────────

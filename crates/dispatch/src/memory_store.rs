//! In-memory [`SubmissionStore`], used by tests and local runs without PostgreSQL.

use std::collections::BTreeMap;

use adu_core::{ExternalDispatchRecord, Submission, SubmissionData, SubmissionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{RecordOutcome, StoreError, SubmissionStore};

#[derive(Default)]
struct State {
    next_submission_id: SubmissionId,
    next_record_id: i64,
    submissions: BTreeMap<SubmissionId, Submission>,
    records: Vec<ExternalDispatchRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for `submission_id`, for assertions.
    pub async fn record_count(&self, submission_id: SubmissionId) -> usize {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .count()
    }

    pub async fn submission_count(&self) -> usize {
        self.state.read().await.submissions.len()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn create_submission(&self, data: SubmissionData) -> Result<Submission, StoreError> {
        let mut state = self.state.write().await;
        state.next_submission_id += 1;
        let submission = Submission {
            id: state.next_submission_id,
            data,
            created_at: Utc::now(),
            csv_exported_at: None,
        };
        state.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.state.read().await.submissions.get(&id).cloned())
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self.state.read().await.submissions.values().cloned().collect())
    }

    async fn delete_submission(&self, id: SubmissionId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.submissions.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state.records.retain(|r| r.submission_id != id);
        Ok(())
    }

    async fn record_external_dispatch(
        &self,
        submission_id: SubmissionId,
        system_code: &str,
        external_id: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&submission_id) {
            return Err(StoreError::NotFound(submission_id));
        }
        let exists = state
            .records
            .iter()
            .any(|r| r.submission_id == submission_id && r.system_code == system_code);
        if exists {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        state.next_record_id += 1;
        let record = ExternalDispatchRecord {
            id: state.next_record_id,
            submission_id,
            system_code: system_code.to_string(),
            external_id: external_id.to_string(),
            created_at: Utc::now(),
        };
        state.records.push(record.clone());
        Ok(RecordOutcome::Recorded(record))
    }

    async fn find_external_records_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<ExternalDispatchRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn find_submissions_pending_csv_export(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .submissions
            .values()
            .filter(|s| s.csv_exported_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_csv_exported(
        &self,
        ids: &[SubmissionId],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(submission) = state.submissions.get_mut(id) {
                if submission.csv_exported_at.is_none() {
                    submission.csv_exported_at = Some(at);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> SubmissionData {
        json!({"block": "1", "lot": "2"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.create_submission(data()).await.unwrap();
        let b = store.create_submission(data()).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.list_submissions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_record_is_reported_not_inserted() {
        let store = MemoryStore::new();
        let s = store.create_submission(data()).await.unwrap();

        let first = store.record_external_dispatch(s.id, "dbi", "ext-1").await.unwrap();
        assert!(matches!(first, RecordOutcome::Recorded(ref r) if r.external_id == "ext-1"));

        let second = store.record_external_dispatch(s.id, "dbi", "ext-2").await.unwrap();
        assert_eq!(second, RecordOutcome::AlreadyRecorded);
        assert_eq!(store.record_count(s.id).await, 1);
    }

    #[tokio::test]
    async fn record_for_unknown_submission_fails() {
        let store = MemoryStore::new();
        let err = store.record_external_dispatch(99, "dbi", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(99)));
    }

    #[tokio::test]
    async fn delete_removes_submission_and_records() {
        let store = MemoryStore::new();
        let s = store.create_submission(data()).await.unwrap();
        store.record_external_dispatch(s.id, "dbi", "1").await.unwrap();

        store.delete_submission(s.id).await.unwrap();
        assert_eq!(store.submission_count().await, 0);
        assert_eq!(store.record_count(s.id).await, 0);
        assert!(store.get_submission(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_exported_sets_timestamp_once() {
        let store = MemoryStore::new();
        let a = store.create_submission(data()).await.unwrap();
        let b = store.create_submission(data()).await.unwrap();

        let first = Utc::now();
        assert_eq!(store.mark_csv_exported(&[a.id], first).await.unwrap(), 1);

        let pending = store.find_submissions_pending_csv_export().await.unwrap();
        assert_eq!(pending.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b.id]);

        let later = first + chrono::Duration::hours(1);
        assert_eq!(store.mark_csv_exported(&[a.id, b.id], later).await.unwrap(), 1);
        let a = store.get_submission(a.id).await.unwrap().unwrap();
        assert_eq!(a.csv_exported_at, Some(first));
    }
}

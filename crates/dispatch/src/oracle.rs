//! Completion Oracle: which systems already accepted a submission.

use std::collections::HashSet;

use adu_core::{ExternalDispatchRecord, SubmissionId};

use crate::store::{StoreError, SubmissionStore};

/// System codes with a persisted external dispatch record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedSystems(HashSet<String>);

impl CompletedSystems {
    pub fn from_records(records: &[ExternalDispatchRecord]) -> Self {
        Self(records.iter().map(|r| r.system_code.clone()).collect())
    }

    pub fn contains(&self, system_code: &str) -> bool {
        self.0.contains(system_code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CompletedSystems {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Read-only view over persisted records.
pub struct CompletionOracle<'a> {
    store: &'a dyn SubmissionStore,
}

impl<'a> CompletionOracle<'a> {
    pub fn new(store: &'a dyn SubmissionStore) -> Self {
        Self { store }
    }

    pub async fn completed(
        &self,
        submission_id: SubmissionId,
    ) -> Result<CompletedSystems, StoreError> {
        let records = self.store.find_external_records_for(submission_id).await?;
        Ok(CompletedSystems::from_records(&records))
    }

    pub async fn is_done(
        &self,
        submission_id: SubmissionId,
        system_code: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.completed(submission_id).await?.contains(system_code))
    }
}

//! Dispatcher: executes one `(submission, system)` delivery attempt.
//!
//! ```text
//! PENDING ──▶ RUNNING ──▶ SUCCEEDED
//!                │
//!                ├──▶ RETRY_SCHEDULED ──(interval)──▶ RUNNING
//!                └──▶ GAVE_UP
//! ```
//!
//! Retry waits go through `JobQueue::enqueue_delayed`; a worker never sleeps
//! on a failed job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use adu_core::{SystemKind, SystemNode, SystemRegistry};
use adu_queue::{encode, JobHandle, JobQueue};
use adu_template::{CsvFormat, CsvWriter, FieldLayout};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::artifact::{single_artifact_name, ArtifactSink, FsArtifactSink};
use crate::client::{parse_external_id, ExternalApi, ReqwestExternalApi};
use crate::endpoint::{EndpointResolver, EnvResolver};
use crate::error::DispatchError;
use crate::retry::RetryDecision;
use crate::scheduler::{DispatchJob, ScheduledJob, Scheduler};
use crate::store::{RecordOutcome, StoreError, SubmissionStore};

/// Response bodies are cut to this many characters in error messages.
const MAX_BODY_IN_ERROR: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Pending,
    Running,
    Succeeded,
    RetryScheduled,
    GaveUp,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::GaveUp)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::RetryScheduled => "retry_scheduled",
            Self::GaveUp => "gave_up",
        };
        f.write_str(s)
    }
}

/// Where a single attempt left the job.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Succeeded {
        /// `None` for CSV-kind systems, which produce an artifact instead.
        external_id: Option<String>,
        /// Dependant jobs enqueued after this success.
        unlocked: Vec<ScheduledJob>,
    },
    RetryScheduled {
        failures: u32,
        delay: Duration,
        handle: JobHandle,
    },
    GaveUp {
        failures: u32,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn state(&self) -> DispatchState {
        match self {
            Self::Succeeded { .. } => DispatchState::Succeeded,
            Self::RetryScheduled { .. } => DispatchState::RetryScheduled,
            Self::GaveUp { .. } => DispatchState::GaveUp,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<SystemRegistry>,
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn JobQueue>,
    scheduler: Scheduler,
    api: Arc<dyn ExternalApi>,
    endpoints: Arc<dyn EndpointResolver>,
    artifacts: Arc<dyn ArtifactSink>,
    csv_format: CsvFormat,
}

impl Dispatcher {
    /// Dispatcher with production collaborators: reqwest, process env,
    /// artifacts under `./csv`. Override them with the `with_*` builders.
    pub fn new(
        registry: Arc<SystemRegistry>,
        store: Arc<dyn SubmissionStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone(), queue.clone());
        Self {
            registry,
            store,
            queue,
            scheduler,
            api: Arc::new(ReqwestExternalApi::default()),
            endpoints: Arc::new(EnvResolver),
            artifacts: Arc::new(FsArtifactSink::new("csv")),
            csv_format: CsvFormat::default(),
        }
    }

    pub fn with_api(mut self, api: Arc<dyn ExternalApi>) -> Self {
        self.api = api;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Arc<dyn EndpointResolver>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_csv_format(mut self, csv_format: CsvFormat) -> Self {
        self.csv_format = csv_format;
        self
    }

    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one attempt of `job` to a terminal state or a scheduled retry.
    ///
    /// Errors returned here are infrastructure failures (the retry could not
    /// be enqueued); delivery problems are expressed through the outcome.
    pub async fn run(&self, job: DispatchJob) -> Result<DispatchOutcome, DispatchError> {
        let Some(node) = self.registry.node(&job.system) else {
            let reason = DispatchError::UnknownSystem(job.system.to_string()).to_string();
            warn!(
                submission_id = job.submission_id(),
                system = %job.system,
                "system no longer in registry, dropping job"
            );
            return Ok(DispatchOutcome::GaveUp {
                failures: job.retry.failures,
                reason,
            });
        };

        // A submission rolled back by intake may still have queued jobs.
        match self.store.get_submission(job.submission_id()).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    "submission no longer exists, dropping job"
                );
                return Ok(DispatchOutcome::GaveUp {
                    failures: job.retry.failures,
                    reason: StoreError::NotFound(job.submission_id()).to_string(),
                });
            }
            Err(e) => return self.retry_or_give_up(job, node, DispatchError::Store(e)).await,
        }

        info!(
            submission_id = job.submission_id(),
            system = %job.system,
            kind = %node.kind,
            attempt = job.retry.failures + 1,
            state = %DispatchState::Running,
            "dispatch attempt"
        );

        let result = match node.kind {
            SystemKind::CsvExport => self.export_single(&job, node).await,
            SystemKind::ApiCall => self.call_api(&job, node).await,
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_retryable() => self.retry_or_give_up(job, node, e).await,
            Err(e) => {
                error!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    error = %e,
                    "dispatch failed permanently"
                );
                Ok(DispatchOutcome::GaveUp {
                    failures: job.retry.failures + 1,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn call_api(
        &self,
        job: &DispatchJob,
        node: &SystemNode,
    ) -> Result<DispatchOutcome, DispatchError> {
        let endpoint_ref = node
            .endpoint_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                DispatchError::Configuration(format!("env_var required for api system {}", job.system))
            })?;
        let url = self
            .endpoints
            .resolve(endpoint_ref)
            .ok_or_else(|| DispatchError::Configuration(format!("no url set for {endpoint_ref}")))?;

        let layout = FieldLayout::from_template(&node.template);
        let payload = Value::Object(layout.payload(&job.submission.data));

        let response = self.api.post_json(&url, &payload).await?;
        info!(
            submission_id = job.submission_id(),
            system = %job.system,
            status = response.status,
            "external system responded"
        );
        if !response.is_success() {
            let body: String = response.body.chars().take(MAX_BODY_IN_ERROR).collect();
            return Err(DispatchError::Delivery(format!(
                "received {} from {url}: {body}",
                response.status
            )));
        }

        let external_id = parse_external_id(&response.body)?;
        match self
            .store
            .record_external_dispatch(job.submission_id(), job.system.code(), &external_id)
            .await?
        {
            RecordOutcome::Recorded(record) => info!(
                submission_id = job.submission_id(),
                system = %job.system,
                external_id = %record.external_id,
                "external id saved"
            ),
            RecordOutcome::AlreadyRecorded => info!(
                submission_id = job.submission_id(),
                system = %job.system,
                "external id already recorded by another dispatch"
            ),
        }

        let unlocked = self.unlock_dependants(job, node).await;
        Ok(DispatchOutcome::Succeeded {
            external_id: Some(external_id),
            unlocked,
        })
    }

    /// Schedule the dependants of a node that just succeeded.
    ///
    /// The record is already persisted at this point, so a failure here is
    /// logged instead of retrying the delivery; `resume` picks the
    /// dependants up later.
    async fn unlock_dependants(&self, job: &DispatchJob, node: &SystemNode) -> Vec<ScheduledJob> {
        if node.dependants.is_empty() {
            return Vec::new();
        }
        match self
            .scheduler
            .schedule_nodes(&job.submission, &job.system, &node.dependants)
            .await
        {
            Ok(jobs) => {
                info!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    unlocked = jobs.len(),
                    "dependants unlocked"
                );
                jobs
            }
            Err(e) => {
                error!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    error = %e,
                    "failed to schedule dependants"
                );
                Vec::new()
            }
        }
    }

    async fn export_single(
        &self,
        job: &DispatchJob,
        node: &SystemNode,
    ) -> Result<DispatchOutcome, DispatchError> {
        let layout = FieldLayout::from_template(&node.template);
        let mut writer = CsvWriter::new(self.csv_format.clone(), &layout);
        writer.push_row(job.submission_id(), &layout.extract(&job.submission.data));

        let name = single_artifact_name(job.system.code(), job.submission_id(), Utc::now());
        let location = self.artifacts.write(&name, &writer.finish()).await?;
        info!(
            submission_id = job.submission_id(),
            system = %job.system,
            location = %location,
            "csv artifact written"
        );
        Ok(DispatchOutcome::Succeeded {
            external_id: None,
            unlocked: Vec::new(),
        })
    }

    async fn retry_or_give_up(
        &self,
        mut job: DispatchJob,
        node: &SystemNode,
        cause: DispatchError,
    ) -> Result<DispatchOutcome, DispatchError> {
        match job.retry.record_failure(&node.retry_policy) {
            RetryDecision::GiveUp => {
                warn!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    failures = job.retry.failures,
                    error = %cause,
                    "retries exhausted, giving up"
                );
                Ok(DispatchOutcome::GaveUp {
                    failures: job.retry.failures,
                    reason: cause.to_string(),
                })
            }
            RetryDecision::RetryAfter(delay) => {
                let failures = job.retry.failures;
                let handle = self.queue.enqueue_delayed(encode(&job)?, delay).await?;
                info!(
                    submission_id = job.submission_id(),
                    system = %job.system,
                    failures,
                    delay_secs = delay.as_secs(),
                    job_id = %handle,
                    error = %cause,
                    "retry scheduled"
                );
                Ok(DispatchOutcome::RetryScheduled {
                    failures,
                    delay,
                    handle,
                })
            }
        }
    }
}

//! Dispatch Scheduler.
//!
//! Completion is derived from persisted records only, so scheduling the same
//! submission again (after a restart, or from a dependant unlock) enqueues
//! exactly the systems that are still missing.

use std::sync::Arc;

use adu_core::{Submission, SubmissionId, SystemMap, SystemPath, SystemRegistry, MAX_REGISTRY_DEPTH};
use adu_queue::{encode, JobHandle, JobQueue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::oracle::{CompletedSystems, CompletionOracle};
use crate::retry::RetryCounter;
use crate::store::SubmissionStore;

/// Queued unit of work: deliver `submission` to the system at `system`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchJob {
    pub submission: Submission,
    pub system: SystemPath,
    #[serde(default)]
    pub retry: RetryCounter,
}

impl DispatchJob {
    pub fn new(submission: Submission, system: SystemPath) -> Self {
        Self {
            submission,
            system,
            retry: RetryCounter::default(),
        }
    }

    pub fn submission_id(&self) -> SubmissionId {
        self.submission.id
    }
}

/// Handle of an enqueued job together with the system it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    pub handle: JobHandle,
    pub system: SystemPath,
}

impl ScheduledJob {
    pub fn code(&self) -> &str {
        self.system.code()
    }
}

/// Systems under `parent` that are eligible for dispatch right now.
///
/// A node not in `done` is on the frontier; a done node contributes the
/// frontier of its dependants. Output follows declaration order.
pub fn frontier(
    nodes: &SystemMap,
    done: &CompletedSystems,
    parent: &SystemPath,
) -> Result<Vec<SystemPath>, DispatchError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    if parent.depth() >= MAX_REGISTRY_DEPTH {
        return Err(DispatchError::DepthExceeded {
            max: MAX_REGISTRY_DEPTH,
        });
    }

    let mut out = Vec::new();
    for (code, node) in nodes {
        let path = parent.child(code);
        if !done.contains(code) {
            out.push(path);
        } else if !node.dependants.is_empty() {
            out.extend(frontier(&node.dependants, done, &path)?);
        }
    }
    Ok(out)
}

/// Enqueues dispatch jobs for a submission's frontier.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn JobQueue>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn SubmissionStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Schedule from the top of the registry.
    pub async fn schedule(
        &self,
        submission: &Submission,
        registry: &SystemRegistry,
    ) -> Result<Vec<ScheduledJob>, DispatchError> {
        self.schedule_nodes(submission, &SystemPath::root(), registry.systems())
            .await
    }

    /// Schedule the frontier of `nodes`, which live under `parent` in the registry.
    pub async fn schedule_nodes(
        &self,
        submission: &Submission,
        parent: &SystemPath,
        nodes: &SystemMap,
    ) -> Result<Vec<ScheduledJob>, DispatchError> {
        let done = CompletionOracle::new(self.store.as_ref())
            .completed(submission.id)
            .await?;
        let paths = frontier(nodes, &done, parent)?;
        debug!(
            submission_id = submission.id,
            done = done.len(),
            frontier = paths.len(),
            "computed dispatch frontier"
        );

        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            let job = DispatchJob::new(submission.clone(), path.clone());
            let handle = self.queue.enqueue(encode(&job)?).await?;
            info!(
                submission_id = submission.id,
                system = %path,
                job_id = %handle,
                "dispatch scheduled"
            );
            jobs.push(ScheduledJob {
                handle,
                system: path,
            });
        }
        Ok(jobs)
    }
}

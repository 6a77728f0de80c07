//! Re-run scheduling for every stored submission and drain the queue.
//!
//! Completion comes from persisted records only, so this enqueues just the
//! missing frontier of each submission. Retry counters start from zero.

use adu_dispatch::{WorkerPool, WorkerStats};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::startup::Components;

#[derive(Debug, Default, Serialize)]
pub struct ResumeReport {
    pub submissions: usize,
    pub scheduled: usize,
    pub failed: usize,
    pub workers: WorkerStats,
}

pub async fn resume(components: &Components) -> anyhow::Result<ResumeReport> {
    let state = &components.state;
    let submissions = state.store.list_submissions().await?;
    info!(submissions = submissions.len(), "resume: rescheduling stored submissions");

    let mut report = ResumeReport {
        submissions: submissions.len(),
        ..Default::default()
    };
    for submission in &submissions {
        match state.scheduler.schedule(submission, &state.registry).await {
            Ok(jobs) => report.scheduled += jobs.len(),
            Err(e) => {
                report.failed += 1;
                error!(submission_id = submission.id, error = %e, "resume: scheduling failed");
            }
        }
    }

    components.queue.close();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::new(
        components.dispatcher.clone(),
        components.queue.clone(),
        state.config.dispatch.workers,
    );
    report.workers = pool.run(shutdown_rx).await;

    info!(
        submissions = report.submissions,
        scheduled = report.scheduled,
        failed = report.failed,
        succeeded = report.workers.succeeded,
        gave_up = report.workers.gave_up,
        "resume complete"
    );
    Ok(report)
}

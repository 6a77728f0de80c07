//! Worker pool draining the dispatch queue.
//!
//! Concurrency is bounded by a semaphore; each message runs in its own task
//! and is acked once the dispatcher reaches an outcome. Retries never occupy
//! a permit while they wait, since the dispatcher re-enqueues them delayed.

use std::sync::Arc;
use std::time::Duration;

use adu_queue::{decode, QueueConsumer, QueueError, QueueMessage};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchState, Dispatcher};
use crate::scheduler::DispatchJob;

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(1);

/// Deliveries of the same message after which an infrastructure failure drops it.
const MAX_DELIVERIES: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub succeeded: u64,
    pub retry_scheduled: u64,
    pub gave_up: u64,
    /// Returned to the queue after an infrastructure failure.
    pub requeued: u64,
    /// Undecodable or repeatedly failing messages that were discarded.
    pub dropped: u64,
}

impl WorkerStats {
    pub fn total(&self) -> u64 {
        self.succeeded + self.retry_scheduled + self.gave_up + self.requeued + self.dropped
    }

    fn absorb(&mut self, result: TaskResult) {
        match result {
            TaskResult::Finished(DispatchState::Succeeded) => self.succeeded += 1,
            TaskResult::Finished(DispatchState::RetryScheduled) => self.retry_scheduled += 1,
            TaskResult::Finished(DispatchState::GaveUp) => self.gave_up += 1,
            TaskResult::Finished(DispatchState::Pending | DispatchState::Running) => {}
            TaskResult::Requeued => self.requeued += 1,
            TaskResult::Dropped => self.dropped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskResult {
    Finished(DispatchState),
    Requeued,
    Dropped,
}

pub struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    consumer: Arc<dyn QueueConsumer>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        consumer: Arc<dyn QueueConsumer>,
        concurrency: usize,
    ) -> Self {
        Self {
            dispatcher,
            consumer,
            concurrency: concurrency.max(1),
        }
    }

    /// Process jobs until `shutdown` flips to `true` (or its sender is
    /// dropped) or the queue reports it is closed and drained. In-flight
    /// jobs are awaited before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut stats = WorkerStats::default();

        info!(concurrency = self.concurrency, "dispatch workers started");

        loop {
            while let Some(done) = tasks.try_join_next() {
                absorb_joined(&mut stats, done);
            }
            if *shutdown.borrow() {
                break;
            }

            let available = semaphore.available_permits();
            if available == 0 {
                if let Some(done) = tasks.join_next().await {
                    absorb_joined(&mut stats, done);
                }
                continue;
            }

            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                polled = self.consumer.poll_batch(available as u32) => polled,
            };

            let messages = match polled {
                Ok(messages) => messages,
                Err(QueueError::Closed) => {
                    info!("dispatch queue closed and drained");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "dispatch queue poll failed");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            for msg in messages {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let dispatcher = self.dispatcher.clone();
                let consumer = self.consumer.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    process(&dispatcher, consumer.as_ref(), msg).await
                });
            }
        }

        while let Some(done) = tasks.join_next().await {
            absorb_joined(&mut stats, done);
        }
        info!(
            succeeded = stats.succeeded,
            retry_scheduled = stats.retry_scheduled,
            gave_up = stats.gave_up,
            requeued = stats.requeued,
            dropped = stats.dropped,
            "dispatch workers stopped"
        );
        stats
    }
}

fn absorb_joined(stats: &mut WorkerStats, joined: Result<TaskResult, tokio::task::JoinError>) {
    match joined {
        Ok(result) => stats.absorb(result),
        Err(e) => error!(error = %e, "dispatch task panicked"),
    }
}

async fn process(dispatcher: &Dispatcher, consumer: &dyn QueueConsumer, msg: QueueMessage) -> TaskResult {
    let job: DispatchJob = match decode(&msg) {
        Ok(job) => job,
        Err(e) => {
            error!(message_id = %msg.id, error = %e, "dropping undecodable dispatch job");
            ack(consumer, &msg).await;
            return TaskResult::Dropped;
        }
    };
    let submission_id = job.submission_id();
    let system = job.system.clone();

    match dispatcher.run(job).await {
        Ok(outcome) => {
            ack(consumer, &msg).await;
            TaskResult::Finished(outcome.state())
        }
        Err(e) if msg.attempt_count >= MAX_DELIVERIES => {
            error!(
                submission_id,
                system = %system,
                deliveries = msg.attempt_count,
                error = %e,
                "dropping dispatch job after repeated infrastructure failures"
            );
            ack(consumer, &msg).await;
            TaskResult::Dropped
        }
        Err(e) => {
            warn!(
                submission_id,
                system = %system,
                error = %e,
                "dispatch infrastructure failure, returning job to queue"
            );
            if let Err(e) = consumer.nack(&msg.receipt_handle).await {
                error!(message_id = %msg.id, error = %e, "nack failed");
            }
            TaskResult::Requeued
        }
    }
}

async fn ack(consumer: &dyn QueueConsumer, msg: &QueueMessage) {
    if let Err(e) = consumer.ack(&msg.receipt_handle).await {
        error!(message_id = %msg.id, error = %e, "ack failed");
    }
}

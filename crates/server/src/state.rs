use std::sync::Arc;

use adu_core::{Config, SystemRegistry};
use adu_dispatch::{Scheduler, SubmissionStore};
use adu_queue::JobQueue;

/// Shared state behind every intake handler.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SystemRegistry>,
    pub store: Arc<dyn SubmissionStore>,
    pub queue: Arc<dyn JobQueue>,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<SystemRegistry>,
        store: Arc<dyn SubmissionStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone(), queue.clone());
        Self {
            config,
            registry,
            store,
            queue,
            scheduler,
        }
    }
}

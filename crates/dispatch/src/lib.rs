//! Dependency-aware dispatch of submissions to external systems.
//!
//! The [`Scheduler`] walks the system registry and enqueues a job for every
//! system on the submission's frontier. [`Dispatcher`] executes one job,
//! persisting success, unlocking dependants, or re-enqueueing with a delay
//! according to the node's retry policy. [`BatchExporter`] produces the
//! periodic CSV artifacts.

pub mod artifact;
pub mod client;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod exporter;
pub mod memory_store;
pub mod oracle;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use artifact::{ArtifactSink, FsArtifactSink, MemoryArtifactSink};
pub use client::{parse_external_id, ExternalApi, HttpResponse, ReqwestExternalApi};
pub use dispatcher::{DispatchOutcome, DispatchState, Dispatcher};
pub use endpoint::{EndpointResolver, EnvResolver, MapResolver};
pub use error::DispatchError;
pub use exporter::{BatchExporter, ExportReport};
pub use memory_store::MemoryStore;
pub use oracle::{CompletedSystems, CompletionOracle};
pub use retry::{RetryCounter, RetryDecision};
pub use scheduler::{frontier, DispatchJob, ScheduledJob, Scheduler};
pub use store::{RecordOutcome, StoreError, SubmissionStore};
pub use worker::{WorkerPool, WorkerStats};

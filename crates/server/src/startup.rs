//! Component wiring shared by every subcommand.

use std::sync::Arc;
use std::time::Duration;

use adu_core::{Config, SystemRegistry};
use adu_dispatch::{
    BatchExporter, Dispatcher, EnvResolver, FsArtifactSink, MemoryStore, ReqwestExternalApi,
    SubmissionStore,
};
use adu_queue::MemoryQueue;
use adu_template::CsvFormat;
use tracing::{info, warn};

use crate::db;
use crate::pg_store::PgSubmissionStore;
use crate::state::AppState;

/// Everything a subcommand may need, built once from config.
pub struct Components {
    pub state: Arc<AppState>,
    pub queue: Arc<MemoryQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub exporter: Arc<BatchExporter>,
}

pub async fn build(config: Config) -> anyhow::Result<Components> {
    let registry = Arc::new(SystemRegistry::load_or_builtin(
        config.dispatch.registry_path.as_deref(),
    )?);
    info!(
        systems = registry.len(),
        csv_systems = registry.csv_nodes().len(),
        depth = registry.depth(),
        "system registry loaded"
    );

    let store = init_store(&config).await?;
    let queue = Arc::new(MemoryQueue::new());
    let csv_format = CsvFormat::new(config.export.delimiter);
    let artifacts = Arc::new(FsArtifactSink::new(config.export.csv_dir.clone()));

    let dispatcher = Dispatcher::new(registry.clone(), store.clone(), queue.clone())
        .with_api(Arc::new(ReqwestExternalApi::new(Duration::from_secs(
            config.dispatch.http_timeout_secs,
        ))))
        .with_endpoints(Arc::new(EnvResolver))
        .with_artifacts(artifacts.clone())
        .with_csv_format(csv_format.clone());

    let exporter = BatchExporter::new(registry.clone(), store.clone(), artifacts, csv_format);
    let state = AppState::new(config, registry, store, queue.clone());

    Ok(Components {
        state: Arc::new(state),
        queue,
        dispatcher: Arc::new(dispatcher),
        exporter: Arc::new(exporter),
    })
}

/// PostgreSQL when configured, in-memory only when it is not.
async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn SubmissionStore>> {
    let store: Arc<dyn SubmissionStore> = match db::init_pg_pool(&config.postgres).await? {
        Some(pool) => {
            info!("submission store: postgres");
            Arc::new(PgSubmissionStore::new(pool))
        }
        None => {
            warn!("submission store: in-memory, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

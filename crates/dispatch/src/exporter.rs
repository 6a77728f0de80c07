//! Batch Exporter: periodic CSV artifacts for not-yet-exported submissions.
//!
//! `csv_exported_at IS NULL` at scan time is the only gate, and the scan and
//! the mark are not atomic. Run a single exporter instance.

use std::sync::Arc;

use adu_core::{Submission, SubmissionId, SystemNode, SystemPath, SystemRegistry};
use adu_template::{CsvFormat, CsvWriter, FieldLayout};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::artifact::{batch_artifact_name, ArtifactSink};
use crate::error::DispatchError;
use crate::store::SubmissionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub system: SystemPath,
    pub location: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub artifacts: Vec<ArtifactReport>,
    pub exported: Vec<SubmissionId>,
    /// Rows whose `csv_exported_at` this run set.
    pub marked: u64,
}

/// Render one system's batch artifact: header, then one row per submission.
pub fn render_batch(node: &SystemNode, submissions: &[Submission], format: &CsvFormat) -> String {
    let layout = FieldLayout::from_template(&node.template);
    let mut writer = CsvWriter::new(format.clone(), &layout);
    for submission in submissions {
        writer.push_row(submission.id, &layout.extract(&submission.data));
    }
    writer.finish()
}

pub struct BatchExporter {
    registry: Arc<SystemRegistry>,
    store: Arc<dyn SubmissionStore>,
    artifacts: Arc<dyn ArtifactSink>,
    csv_format: CsvFormat,
}

impl BatchExporter {
    pub fn new(
        registry: Arc<SystemRegistry>,
        store: Arc<dyn SubmissionStore>,
        artifacts: Arc<dyn ArtifactSink>,
        csv_format: CsvFormat,
    ) -> Self {
        Self {
            registry,
            store,
            artifacts,
            csv_format,
        }
    }

    pub async fn run(&self) -> Result<ExportReport, DispatchError> {
        self.run_at(Utc::now()).await
    }

    /// Export every pending submission for every CSV-kind system, then mark
    /// them exported with `now`. Nothing is marked unless all artifacts were
    /// written.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ExportReport, DispatchError> {
        let pending = self.store.find_submissions_pending_csv_export().await?;
        let nodes = self.registry.csv_nodes();
        info!(
            pending = pending.len(),
            systems = nodes.len(),
            "batch export started"
        );

        if pending.is_empty() || nodes.is_empty() {
            info!("batch export finished: nothing to export");
            return Ok(ExportReport::default());
        }

        let mut report = ExportReport::default();
        for (path, node) in nodes {
            let contents = render_batch(node, &pending, &self.csv_format);
            let name = batch_artifact_name(path.code(), now);
            let location = self.artifacts.write(&name, &contents).await?;
            info!(system = %path, location = %location, rows = pending.len(), "csv artifact written");
            report.artifacts.push(ArtifactReport {
                system: path,
                location,
                rows: pending.len(),
            });
        }

        report.exported = pending.iter().map(|s| s.id).collect();
        report.marked = self.store.mark_csv_exported(&report.exported, now).await?;
        info!(
            artifacts = report.artifacts.len(),
            exported = report.exported.len(),
            marked = report.marked,
            "batch export finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use adu_core::{SimpleField, SystemMap, TemplateField};
    use async_trait::async_trait;
    use serde_json::json;

    use crate::artifact::MemoryArtifactSink;
    use crate::memory_store::MemoryStore;

    fn registry() -> Arc<SystemRegistry> {
        let mut map = SystemMap::new();
        map.insert("dbi".into(), SystemNode::api("DBI_SYSTEM_URL"));
        map.insert(
            "permit".into(),
            SystemNode::csv().with_template(vec![
                TemplateField::simple("Block", "block"),
                TemplateField::grouping(2, vec![SimpleField::new("ADU %#% type", "t_%#%")]),
            ]),
        );
        Arc::new(SystemRegistry::new(map).unwrap())
    }

    fn exporter(store: Arc<MemoryStore>, sink: Arc<MemoryArtifactSink>) -> BatchExporter {
        BatchExporter::new(registry(), store, sink, CsvFormat::default())
    }

    #[tokio::test]
    async fn exports_pending_and_marks_them() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemoryArtifactSink::new());
        let a = store
            .create_submission(json!({"block": "1", "t_1": "garage"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let b = store
            .create_submission(json!({"block": 7, "t_2": "attic"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let report = exporter(store.clone(), sink.clone()).run().await.unwrap();
        assert_eq!(report.exported, vec![a.id, b.id]);
        assert_eq!(report.marked, 2);
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].system.to_string(), "permit");

        let files = sink.artifacts().await;
        assert_eq!(files.len(), 1);
        assert!(files[0].0.starts_with("permit_"));
        assert_eq!(
            files[0].1,
            format!(
                "adu_id|Block|ADU 1 type|ADU 2 type\n{}|\"1\"|\"garage\"|\n{}|7||\"attic\"\n",
                a.id, b.id
            )
        );
        assert!(store.find_submissions_pending_csv_export().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_run_exports_only_new_submissions() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemoryArtifactSink::new());
        let ex = exporter(store.clone(), sink.clone());

        store
            .create_submission(json!({"block": "1"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        ex.run().await.unwrap();

        let empty = ex.run().await.unwrap();
        assert_eq!(empty, ExportReport::default());

        let c = store
            .create_submission(json!({"block": "3"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let report = ex.run().await.unwrap();
        assert_eq!(report.exported, vec![c.id]);
        assert_eq!(sink.artifacts().await.len(), 2);
    }

    /// Accepts the first write, fails every later one.
    struct FailingSink {
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ArtifactSink for FailingSink {
        async fn write(&self, name: &str, _contents: &str) -> Result<String, DispatchError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(format!("memory://{name}"))
            } else {
                Err(DispatchError::Artifact(format!("{name}: disk full")))
            }
        }
    }

    #[tokio::test]
    async fn failed_artifact_write_leaves_submissions_pending() {
        let mut map = SystemMap::new();
        map.insert(
            "permit".into(),
            SystemNode::csv().with_template(vec![TemplateField::simple("Block", "block")]),
        );
        map.insert(
            "assessor".into(),
            SystemNode::csv().with_template(vec![TemplateField::simple("Lot", "lot")]),
        );
        let registry = Arc::new(SystemRegistry::new(map).unwrap());

        let store = Arc::new(MemoryStore::new());
        for block in ["1", "2"] {
            store
                .create_submission(json!({"block": block, "lot": "9"}).as_object().cloned().unwrap())
                .await
                .unwrap();
        }

        let writes = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(FailingSink {
            writes: writes.clone(),
        });
        let ex = BatchExporter::new(registry, store.clone(), sink, CsvFormat::default());

        let err = ex.run().await.unwrap_err();
        assert!(matches!(err, DispatchError::Artifact(_)));
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.find_submissions_pending_csv_export().await.unwrap().len(),
            2
        );
    }
}

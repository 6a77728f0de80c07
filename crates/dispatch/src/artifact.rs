//! Destinations for CSV artifacts.

use std::path::PathBuf;

use adu_core::SubmissionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::DispatchError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of an artifact holding one submission for one system.
pub fn single_artifact_name(code: &str, id: SubmissionId, at: DateTime<Utc>) -> String {
    format!("{code}_submission_{id}_{}.csv", at.format(TIMESTAMP_FORMAT))
}

/// Name of a batch artifact for one system.
pub fn batch_artifact_name(code: &str, at: DateTime<Utc>) -> String {
    format!("{code}_{}.csv", at.format(TIMESTAMP_FORMAT))
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store `contents` under `name`, returning where it ended up.
    async fn write(&self, name: &str, contents: &str) -> Result<String, DispatchError>;
}

/// Writes artifacts into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn write(&self, name: &str, contents: &str) -> Result<String, DispatchError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DispatchError::Artifact(format!("{}: {e}", self.dir.display())))?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| DispatchError::Artifact(format!("{}: {e}", path.display())))?;
        Ok(path.display().to_string())
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    files: Mutex<Vec<(String, String)>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, contents)` pairs in write order.
    pub async fn artifacts(&self) -> Vec<(String, String)> {
        self.files.lock().await.clone()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn write(&self, name: &str, contents: &str) -> Result<String, DispatchError> {
        self.files
            .lock()
            .await
            .push((name.to_string(), contents.to_string()));
        Ok(format!("memory://{name}"))
    }
}

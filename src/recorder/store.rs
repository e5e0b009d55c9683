//! Artifact store
//!
//! Append-only list of finalized recordings, in completion order.

use super::state::{Artifact, ArtifactSummary};
use crate::utils::error::{CaptureError, CaptureResult};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: RwLock<Vec<Arc<Artifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new artifact.
    ///
    /// `seal` receives the artifact's index (current length + 1) and is
    /// called under the write lock, so concurrent appends never share an
    /// index and indices match list positions.
    pub fn append(&self, seal: impl FnOnce(usize) -> Artifact) -> Arc<Artifact> {
        let mut artifacts = self.artifacts.write();
        let artifact = Arc::new(seal(artifacts.len() + 1));
        artifacts.push(Arc::clone(&artifact));
        artifact
    }

    /// Snapshot of all artifacts in completion order
    pub fn list(&self) -> Vec<Arc<Artifact>> {
        self.artifacts.read().clone()
    }

    /// Look up an artifact by its 1-based index
    pub fn get(&self, index: usize) -> CaptureResult<Arc<Artifact>> {
        index
            .checked_sub(1)
            .and_then(|i| self.artifacts.read().get(i).cloned())
            .ok_or(CaptureError::NotFound(index))
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    pub fn summaries(&self) -> Vec<ArtifactSummary> {
        self.artifacts.read().iter().map(|a| a.summary()).collect()
    }

    /// Write one artifact's payload into `dir` under its download name
    pub fn export(&self, index: usize, dir: &Path) -> CaptureResult<PathBuf> {
        let artifact = self.get(index)?;
        write_artifact(&artifact, dir)
    }

    /// Write every artifact into `dir`, returning the paths in index order
    pub fn export_all(&self, dir: &Path) -> CaptureResult<Vec<PathBuf>> {
        self.list().iter().map(|a| write_artifact(a, dir)).collect()
    }
}

fn write_artifact(artifact: &Artifact, dir: &Path) -> CaptureResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(artifact.file_name());
    fs::write(&path, artifact.payload())?;
    tracing::info!("Exported artifact #{} to {:?}", artifact.index(), path);
    Ok(path)
}

//! Per-job working directories

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Isolated directory owned by one job
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    id: Uuid,
    path: PathBuf,
}

impl JobWorkspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Allocates job workspaces under a root directory.
///
/// Names come from random v4 uuids; nothing is shared between calls, and
/// workspaces are never removed here.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace
    pub async fn new_workspace(&self) -> Result<JobWorkspace> {
        fs::create_dir_all(&self.root).await?;

        let id = Uuid::new_v4();
        let path = self.root.join(id.to_string());
        // Non-recursive: an existing directory is an error, never shared
        fs::create_dir(&path).await?;

        debug!(job_id = %id, path = ?path, "Created job workspace");

        Ok(JobWorkspace { id, path })
    }
}

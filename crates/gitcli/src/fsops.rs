//! Workspace directory operations backed by [`tokio::fs`].

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use checkout::{PortError, WorkspaceFs};

/// [`WorkspaceFs`] implementation over the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalWorkspaceFs;

impl LocalWorkspaceFs {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self
    }
}

fn seam(err: anyhow::Error) -> PortError {
    PortError::new(format!("{err:#}"))
}

#[async_trait]
impl WorkspaceFs for LocalWorkspaceFs {
    async fn exists(&self, workspace: &Path) -> Result<bool, PortError> {
        tokio::fs::try_exists(workspace)
            .await
            .with_context(|| format!("failed to stat {}", workspace.display()))
            .map_err(seam)
    }

    async fn is_empty_dir(&self, workspace: &Path) -> Result<bool, PortError> {
        let mut entries = tokio::fs::read_dir(workspace)
            .await
            .with_context(|| format!("failed to read {}", workspace.display()))
            .map_err(seam)?;
        let first = entries
            .next_entry()
            .await
            .with_context(|| format!("failed to read {}", workspace.display()))
            .map_err(seam)?;
        Ok(first.is_none())
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn create_dir_all(&self, workspace: &Path) -> Result<(), PortError> {
        tokio::fs::create_dir_all(workspace)
            .await
            .with_context(|| format!("failed to create {}", workspace.display()))
            .map_err(seam)
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn wipe_contents(&self, workspace: &Path) -> Result<(), PortError> {
        let wipe = async {
            let mut entries = tokio::fs::read_dir(workspace)
                .await
                .with_context(|| format!("failed to read {}", workspace.display()))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("failed to read {}", workspace.display()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .with_context(|| format!("failed to stat {}", path.display()))?;
                if file_type.is_dir() {
                    tokio::fs::remove_dir_all(&path)
                        .await
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                } else {
                    tokio::fs::remove_file(&path)
                        .await
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                }
            }
            debug!("workspace contents removed");
            Ok::<_, anyhow::Error>(())
        };
        wipe.await.map_err(seam)
    }
}

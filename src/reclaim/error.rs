//! Reclamation error types.

use std::path::PathBuf;

/// Failure to delete a workspace directory.
#[derive(thiserror::Error, Debug)]
#[error("Failed to delete workspace {workspace_id} at {path}: {source}")]
pub struct ReclaimError {
    pub workspace_id: String,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcript::domain::transcript_segment::TranscriptSegment;

/// Transcript and media reference of a project at the time of loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub project_id: String,
    pub segments: Vec<TranscriptSegment>,
    pub media_duration: f64,
    pub media_location: PathBuf,
}

/// Where the output of an apply run lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaArtifactRef {
    pub location: PathBuf,
    /// SHA-256 of the transcript snapshot, resolved edits and voice.
    pub fingerprint: String,
    /// False when the run was a no-op and `location` is the source media.
    pub changed: bool,
}

/// State written back after a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectUpdate {
    pub segments: Vec<TranscriptSegment>,
    pub media_duration: f64,
    pub artifact: MediaArtifactRef,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("project {0} not found")]
    NotFound(String),
    #[error("invalid project id {0:?}")]
    InvalidProjectId(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a valid project document: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl StorageError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence of project transcripts and their current media.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load(&self, project_id: &str) -> Result<ProjectSnapshot, StorageError>;

    async fn commit(&self, project_id: &str, update: ProjectUpdate) -> Result<(), StorageError>;
}

/// Allocation of output locations for rendered media.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns a writable path for the artifact identified by `fingerprint`.
    /// The same inputs always yield the same path.
    async fn allocate(
        &self,
        project_id: &str,
        fingerprint: &str,
        extension: &str,
    ) -> Result<PathBuf, StorageError>;
}

/// Rejects ids that could escape a storage directory.
pub fn check_project_id(project_id: &str) -> Result<(), StorageError> {
    let valid = !project_id.is_empty()
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !project_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidProjectId(project_id.to_string()))
    }
}

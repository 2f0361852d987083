use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::pipeline::project_store::{
    check_project_id, ProjectSnapshot, ProjectStore, ProjectUpdate, StorageError,
};

/// One `<project_id>.json` document per project inside a directory.
///
/// Commits replace the document atomically: the new JSON is written to a
/// sibling temp file which is then renamed over the old one.
pub struct JsonProjectStore {
    dir: PathBuf,
}

impl JsonProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn document_path(&self, project_id: &str) -> Result<PathBuf, StorageError> {
        check_project_id(project_id)?;
        Ok(self.dir.join(format!("{project_id}.json")))
    }

    /// Writes a snapshot as a new or replacement document.
    pub async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), StorageError> {
        let path = self.document_path(&snapshot.project_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;
        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| StorageError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &json).await
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn load(&self, project_id: &str) -> Result<ProjectSnapshot, StorageError> {
        let path = self.document_path(project_id)?;
        let json = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(project_id.to_string()))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let mut snapshot: ProjectSnapshot =
            serde_json::from_slice(&json).map_err(|e| StorageError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if snapshot.project_id != project_id {
            log::warn!(
                "{} declares project id {:?}, using {project_id:?}",
                path.display(),
                snapshot.project_id
            );
            snapshot.project_id = project_id.to_string();
        }

        // Relative media paths are resolved against the store directory.
        if snapshot.media_location.is_relative() {
            snapshot.media_location = self.dir.join(&snapshot.media_location);
        }
        Ok(snapshot)
    }

    async fn commit(&self, project_id: &str, update: ProjectUpdate) -> Result<(), StorageError> {
        let mut snapshot = self.load(project_id).await?;
        snapshot.segments = update.segments;
        snapshot.media_duration = update.media_duration;
        snapshot.media_location = update.artifact.location;
        self.save(&snapshot).await?;
        log::debug!("Committed project {project_id} ({})", update.artifact.fingerprint);
        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let temp = path.with_extension(format!("json.{:08x}.tmp", rand::random::<u32>()));
    if let Err(e) = tokio::fs::write(&temp, contents).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(StorageError::io(&temp, e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

use std::path::PathBuf;

use async_trait::async_trait;

use crate::pipeline::project_store::{check_project_id, ArtifactStore, StorageError};

/// Length of the fingerprint prefix used in file names.
const NAME_LEN: usize = 16;

/// Places artifacts under `<root>/<project_id>/<fingerprint>.<ext>`.
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for DirectoryArtifactStore {
    async fn allocate(
        &self,
        project_id: &str,
        fingerprint: &str,
        extension: &str,
    ) -> Result<PathBuf, StorageError> {
        check_project_id(project_id)?;
        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::Corrupt {
                path: self.root.clone(),
                message: format!("fingerprint {fingerprint:?} is not hex"),
            });
        }

        let dir = self.root.join(project_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let name = &fingerprint[..fingerprint.len().min(NAME_LEN)];
        Ok(dir.join(format!("{name}.{extension}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[tokio::test]
    async fn test_allocate_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryArtifactStore::new(dir.path());
        let a = store.allocate("demo", FP, "mp4").await.unwrap();
        let b = store.allocate("demo", FP, "mp4").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, dir.path().join("demo").join("9f86d081884c7d65.mp4"));
        assert!(dir.path().join("demo").is_dir());
    }

    #[tokio::test]
    async fn test_allocate_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryArtifactStore::new(dir.path());
        assert!(store.allocate("../x", FP, "mp4").await.is_err());
        assert!(store.allocate("demo", "../../etc", "mp4").await.is_err());
    }
}

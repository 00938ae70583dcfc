//! # JsonSnapshot
//!
//! File persistence for the document store. Views are never written out;
//! they are derived and get rebuilt after a load.

use std::path::{Path, PathBuf};

use domains::{Document, DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
enum SnapshotError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt snapshot {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

impl From<SnapshotError> for DomainError {
    fn from(err: SnapshotError) -> Self {
        DomainError::storage(err)
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    documents: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every persisted document. A missing file is an empty store.
    pub async fn load(&self) -> DomainResult<Vec<Document>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(self.io(source).into()),
        };
        let file: SnapshotFile =
            serde_json::from_slice(&raw).map_err(|source| SnapshotError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if file.version != FORMAT_VERSION {
            return Err(SnapshotError::Version {
                found: file.version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        info!(path = %self.path.display(), documents = file.documents.len(), "snapshot loaded");
        Ok(file.documents)
    }

    /// Writes to a sibling temp file, then renames it over the target, so a
    /// crash mid-write never leaves a truncated snapshot behind.
    pub async fn save(&self, documents: &[Document]) -> DomainResult<()> {
        let file = SnapshotFile {
            version: FORMAT_VERSION,
            documents: documents.to_vec(),
        };
        let raw = serde_json::to_vec_pretty(&file).map_err(|source| SnapshotError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io(source))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &raw).await.map_err(|source| self.io(source))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io(source))?;
        info!(path = %self.path.display(), documents = documents.len(), "snapshot saved");
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Channel, DocumentId, Payload, Revision};

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("threadbase-snapshot-{}", DocumentId::generate()))
            .join(name)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let snapshot = JsonSnapshot::new(scratch_path("absent.json"));
        assert!(snapshot.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_documents_load_back() {
        let snapshot = JsonSnapshot::new(scratch_path("forum.json"));
        let doc = Document {
            id: DocumentId::generate(),
            revision: Revision::initial().next(),
            created_at: chrono::Utc::now(),
            payload: Payload::Channel(Channel {
                name: "general".into(),
                creator_id: DocumentId::generate(),
            }),
        };
        snapshot.save(std::slice::from_ref(&doc)).await.unwrap();
        assert_eq!(snapshot.load().await.unwrap(), vec![doc]);
    }

    #[tokio::test]
    async fn garbage_is_storage_unavailable() {
        let path = scratch_path("garbage.json");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"{ not json").await.unwrap();
        let err = JsonSnapshot::new(&path).load().await.unwrap_err();
        assert!(matches!(err, DomainError::StorageUnavailable(_)));
    }
}

//! # Image stores
//!
//! Implementations of `ImageStore`. Both are content-addressed: the reference
//! is the SHA-256 of the bytes, so identical uploads share one blob.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use domains::{DomainError, DomainResult, ImageRef, ImageStore, ImageUpload};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

fn content_key(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Refs are produced by [`content_key`]; anything else cannot name a blob.
fn check_ref(image_ref: &ImageRef) -> DomainResult<&str> {
    let key = image_ref.as_str();
    if key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(key)
    } else {
        Err(DomainError::not_found("image", image_ref))
    }
}

/// Keeps blobs in process memory.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save(&self, upload: ImageUpload) -> DomainResult<ImageRef> {
        upload.validate()?;
        let key = content_key(&upload.bytes);
        self.blobs.entry(key.clone()).or_insert(upload.bytes);
        debug!(image = %key, "image stored");
        Ok(ImageRef::new(key))
    }

    async fn load(&self, image_ref: &ImageRef) -> DomainResult<Bytes> {
        let key = check_ref(image_ref)?;
        self.blobs
            .get(key)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| DomainError::not_found("image", image_ref))
    }
}

/// Keeps blobs on the local filesystem under a sharded layout.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    /// Root directory for all uploads (e.g., "./data/images")
    root_path: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root.into(),
        }
    }

    /// Generates a sharded path: "ab/cd/abcd...hash"
    fn sharded_path(&self, key: &str) -> PathBuf {
        let mut path = self.root_path.clone();
        path.push(&key[0..2]);
        path.push(&key[2..4]);
        path.push(key);
        path
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, upload: ImageUpload) -> DomainResult<ImageRef> {
        upload.validate()?;
        let key = content_key(&upload.bytes);
        let target = self.sharded_path(&key);

        if fs::try_exists(&target).await.map_err(DomainError::storage)? {
            debug!(image = %key, "image already stored");
            return Ok(ImageRef::new(key));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(DomainError::storage)?;
        }
        fs::write(&target, &upload.bytes)
            .await
            .map_err(DomainError::storage)?;
        debug!(image = %key, path = %target.display(), "image stored");
        Ok(ImageRef::new(key))
    }

    async fn load(&self, image_ref: &ImageRef) -> DomainResult<Bytes> {
        let key = check_ref(image_ref)?;
        match fs::read(self.sharded_path(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::not_found("image", image_ref))
            }
            Err(e) => Err(DomainError::storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(data: &'static [u8]) -> ImageUpload {
        ImageUpload::new(Bytes::from_static(data), mime::IMAGE_PNG)
    }

    #[tokio::test]
    async fn identical_uploads_share_a_blob() {
        let store = MemoryImageStore::new();
        let a = store.save(png(b"\x89PNG same")).await.unwrap();
        let b = store.save(png(b"\x89PNG same")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&a).await.unwrap(), Bytes::from_static(b"\x89PNG same"));
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let store = MemoryImageStore::new();
        let upload = ImageUpload::new(Bytes::from_static(b"<html>"), mime::TEXT_HTML);
        assert!(matches!(
            store.save(upload).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_ref_is_not_found() {
        let store = MemoryImageStore::new();
        assert!(store.load(&ImageRef::new("nope")).await.unwrap_err().is_not_found());
        let absent = ImageRef::new(content_key(b"never saved"));
        assert!(store.load(&absent).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn local_store_round_trips_through_sharded_path() {
        let root = std::env::temp_dir().join(format!("threadbase-images-{}", content_key(b"root")));
        let store = LocalImageStore::new(&root);
        let image_ref = store.save(png(b"\x89PNG local")).await.unwrap();
        let key = image_ref.as_str();
        assert!(root.join(&key[0..2]).join(&key[2..4]).join(key).exists());
        assert_eq!(store.load(&image_ref).await.unwrap(), Bytes::from_static(b"\x89PNG local"));
        // a path-like ref never escapes the root
        assert!(store.load(&ImageRef::new("../../etc/passwd")).await.is_err());
    }
}

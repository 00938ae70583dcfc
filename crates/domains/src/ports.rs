//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be plugged into the services.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::errors::DomainResult;
use crate::inputs::ImageUpload;
use crate::models::{Document, DocumentId, ImageRef, Payload, Revision, Votes};

/// The only mutation `put` accepts. Votes are the sole field that changes
/// after creation, so the mutator never sees anything else.
pub type VoteMutator = Box<dyn FnOnce(&mut Votes) + Send>;

/// A committed store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Created or updated; carries the stored document.
    Upsert(Document),
    /// Removed; carries the last body with the tombstone revision.
    Delete(Document),
}

impl Change {
    pub fn document(&self) -> &Document {
        match self {
            Self::Upsert(doc) | Self::Delete(doc) => doc,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete(_))
    }
}

/// Observer of store mutations. The store awaits every listener before the
/// mutating call returns, which gives the writer read-your-own-writes.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_change(&self, change: &Change);
}

/// Keyed storage of versioned documents.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Assigns id, initial revision and timestamp. Fails with `Validation`
    /// when required payload fields are absent.
    async fn create(&self, payload: Payload) -> DomainResult<Document>;

    async fn get(&self, id: DocumentId) -> DomainResult<Document>;

    /// Compare-and-swap: applies `mutator` to the stored document and persists
    /// only if its revision still equals `expected`, else `Conflict`.
    async fn put(
        &self,
        id: DocumentId,
        expected: Revision,
        mutator: VoteMutator,
    ) -> DomainResult<Document>;

    /// Removes the document and returns its tombstone. `NotFound` if absent.
    async fn delete(&self, id: DocumentId) -> DomainResult<Document>;

    /// Every live document in id order; used for full view rebuilds.
    async fn all_documents(&self) -> DomainResult<Vec<Document>>;

    /// Registers a listener for every subsequent committed mutation.
    fn subscribe(&self, listener: Arc<dyn ChangeListener>);
}

/// Opaque `imageRef <-> bytes` collaborator. The core never decodes images.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, upload: ImageUpload) -> DomainResult<ImageRef>;
    async fn load(&self, image_ref: &ImageRef) -> DomainResult<Bytes>;
}

/// Password hashing collaborator used at registration and credential checks.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash(&self, password: &str) -> DomainResult<String>;
    async fn verify(&self, password: &str, hash: &str) -> bool;
}

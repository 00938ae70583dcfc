//! # MemoryDocumentStore
//!
//! In-process implementation of `DocumentStore` on a sharded `DashMap`.
//! `put` holds the shard write lock of its key while it checks the revision and
//! swaps the document, so compare-and-swap is atomic per key and writers to
//! different documents never wait on each other.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use domains::{
    Change, ChangeListener, Document, DocumentId, DocumentStore, DomainError, DomainResult,
    Payload, Revision, VoteMutator,
};
use tracing::{debug, info};

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentId, Document>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with previously persisted documents. Listeners are not
    /// notified, so views must be rebuilt afterwards.
    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        for doc in documents {
            store.documents.insert(doc.id, doc);
        }
        info!(documents = store.len(), "document store loaded");
        store
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    async fn publish(&self, change: Change) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_change(&change).await;
        }
    }
}

impl fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocumentStore")
            .field("documents", &self.documents.len())
            .finish()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, payload: Payload) -> DomainResult<Document> {
        payload.validate()?;
        let doc = Document {
            id: DocumentId::generate(),
            revision: Revision::initial(),
            created_at: Utc::now(),
            payload,
        };
        self.documents.insert(doc.id, doc.clone());
        debug!(doc = %doc.id, kind = %doc.kind(), "document created");
        self.publish(Change::Upsert(doc.clone())).await;
        Ok(doc)
    }

    async fn get(&self, id: DocumentId) -> DomainResult<Document> {
        self.documents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DomainError::not_found("document", id))
    }

    async fn put(
        &self,
        id: DocumentId,
        expected: Revision,
        mutator: VoteMutator,
    ) -> DomainResult<Document> {
        let updated = {
            let mut entry = self
                .documents
                .get_mut(&id)
                .ok_or_else(|| DomainError::not_found("document", id))?;
            if entry.revision != expected {
                return Err(DomainError::conflict(
                    id,
                    format!("expected revision {expected}, found {}", entry.revision),
                ));
            }
            let mut next = entry.value().clone();
            let kind = next.kind();
            let votes = next.payload.votes_mut().ok_or_else(|| {
                DomainError::validation(format!("{kind} documents have no mutable fields"))
            })?;
            mutator(votes);
            next.revision = next.revision.next();
            *entry = next.clone();
            next
        };
        debug!(doc = %id, revision = %updated.revision, "document updated");
        self.publish(Change::Upsert(updated.clone())).await;
        Ok(updated)
    }

    async fn delete(&self, id: DocumentId) -> DomainResult<Document> {
        let (_, removed) = self
            .documents
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("document", id))?;
        let tombstone = Document {
            revision: removed.revision.next(),
            ..removed
        };
        debug!(doc = %id, revision = %tombstone.revision, "document deleted");
        self.publish(Change::Delete(tombstone.clone())).await;
        Ok(tombstone)
    }

    async fn all_documents(&self) -> DomainResult<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        documents.sort_by_key(|doc| doc.id);
        Ok(documents)
    }

    fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

//! # VoteLedger
//!
//! Read-modify-CAS loop over a document's vote sets. Every attempt re-reads
//! the document, so a losing writer always works from the winner's state.

use std::sync::Arc;

use domains::{
    DocumentId, DocumentStore, DomainError, DomainResult, VoteMutator, VoteTally, VoteType, Votes,
};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

pub struct VoteLedger {
    store: Arc<dyn DocumentStore>,
    max_attempts: usize,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn DocumentStore>, max_attempts: usize) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Clears any earlier vote by `voter` and records `vote`.
    pub async fn apply_vote(
        &self,
        document_id: DocumentId,
        voter: DocumentId,
        vote: VoteType,
    ) -> DomainResult<VoteTally> {
        self.mutate(document_id, move |votes: &mut Votes| votes.cast(voter, vote))
            .await
    }

    /// Removes `voter` from both sets. A voter with no vote is not an error.
    pub async fn retract_vote(
        &self,
        document_id: DocumentId,
        voter: DocumentId,
    ) -> DomainResult<VoteTally> {
        self.mutate(document_id, move |votes: &mut Votes| {
            votes.retract(voter);
        })
        .await
    }

    async fn mutate<F>(&self, document_id: DocumentId, change: F) -> DomainResult<VoteTally>
    where
        F: Fn(&mut Votes) + Clone + Send + 'static,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.store.get(document_id).await?;
            if current.votes().is_none() {
                return Err(DomainError::validation(format!(
                    "{} documents cannot be voted on",
                    current.kind()
                )));
            }

            let mutator: VoteMutator = Box::new(change.clone());
            match self.store.put(document_id, current.revision, mutator).await {
                Ok(updated) => {
                    return Ok(updated.votes().map(Votes::tally).unwrap_or_default());
                }
                Err(DomainError::Conflict { .. }) => {
                    debug!(doc = %document_id, attempt, "revision conflict, retrying vote");
                    tokio::task::yield_now().await;
                }
                Err(other) => return Err(other),
            }
        }

        warn!(doc = %document_id, attempts = self.max_attempts, "vote retries exhausted");
        Err(DomainError::conflict(
            document_id,
            format!("vote not applied after {} attempts", self.max_attempts),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use domains::{Channel, Document, MockDocumentStore, Payload, Post, Revision};
    use tokio_test::{assert_err, assert_ok};

    fn post_doc(revision: Revision) -> Document {
        Document {
            id: DocumentId::generate(),
            revision,
            created_at: chrono::Utc::now(),
            payload: Payload::Post(Post {
                channel_id: DocumentId::generate(),
                title: "t".into(),
                body: "b".into(),
                author_id: DocumentId::generate(),
                author_display_name: "A".into(),
                image_ref: None,
                votes: Votes::default(),
            }),
        }
    }

    /// A store whose `put` conflicts `conflicts` times before applying the mutator.
    fn flaky_store(doc: Document, conflicts: usize) -> (MockDocumentStore, Arc<AtomicUsize>) {
        let puts = Arc::new(AtomicUsize::new(0));
        let mut store = MockDocumentStore::new();
        let read = doc.clone();
        store.expect_get().returning(move |_| Ok(read.clone()));
        let counter = puts.clone();
        store.expect_put().returning(move |id, _, mutator| {
            if counter.fetch_add(1, Ordering::SeqCst) < conflicts {
                return Err(DomainError::conflict(id, "stale revision"));
            }
            let mut updated = doc.clone();
            if let Some(votes) = updated.payload.votes_mut() {
                mutator(votes);
            }
            updated.revision = updated.revision.next();
            Ok(updated)
        });
        (store, puts)
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let doc = post_doc(Revision::initial());
        let (store, puts) = flaky_store(doc.clone(), 2);
        let ledger = VoteLedger::new(Arc::new(store), DEFAULT_MAX_ATTEMPTS);

        let tally = assert_ok!(ledger.apply_vote(doc.id, DocumentId::generate(), VoteType::Up).await);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
        assert_eq!(puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let doc = post_doc(Revision::initial());
        let (store, puts) = flaky_store(doc.clone(), usize::MAX);
        let ledger = VoteLedger::new(Arc::new(store), 3);

        let err = assert_err!(ledger.apply_vote(doc.id, DocumentId::generate(), VoteType::Down).await);
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(err.is_transient());
        assert_eq!(puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_document_is_not_found_without_put() {
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .returning(|id| Err(DomainError::not_found("document", id)));
        store.expect_put().never();
        let ledger = VoteLedger::new(Arc::new(store), DEFAULT_MAX_ATTEMPTS);

        let err = assert_err!(ledger.retract_vote(DocumentId::generate(), DocumentId::generate()).await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn channels_cannot_be_voted_on() {
        let channel = Document {
            id: DocumentId::generate(),
            revision: Revision::initial(),
            created_at: chrono::Utc::now(),
            payload: Payload::Channel(Channel {
                name: "general".into(),
                creator_id: DocumentId::generate(),
            }),
        };
        let mut store = MockDocumentStore::new();
        store.expect_get().returning(move |_| Ok(channel.clone()));
        store.expect_put().never();
        let ledger = VoteLedger::new(Arc::new(store), DEFAULT_MAX_ATTEMPTS);

        let err = assert_err!(ledger.apply_vote(DocumentId::generate(), DocumentId::generate(), VoteType::Up).await);
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn retract_without_vote_returns_current_counts() {
        let doc = post_doc(Revision::initial());
        let (store, _) = flaky_store(doc.clone(), 0);
        let ledger = VoteLedger::new(Arc::new(store), DEFAULT_MAX_ATTEMPTS);
        let tally = assert_ok!(ledger.retract_vote(doc.id, DocumentId::generate()).await);
        assert_eq!(tally, VoteTally::default());
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let ledger = VoteLedger::new(Arc::new(MockDocumentStore::new()), 0);
        assert_eq!(ledger.max_attempts(), 1);
    }
}

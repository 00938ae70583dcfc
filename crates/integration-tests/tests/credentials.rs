//! Registration and credential checks with the real argon2 hasher.

use std::sync::Arc;

use auth_adapters::Argon2Hasher;
use domains::{DomainError, Role};
use integration_tests::Forum;
use services::ForumOptions;
use storage_adapters::MemoryDocumentStore;
use tokio_test::assert_err;

#[tokio::test]
async fn register_then_authenticate() {
    let forum = Forum::start_with_hasher(
        MemoryDocumentStore::new(),
        ForumOptions::default(),
        Arc::new(Argon2Hasher::new()),
    )
    .await;

    let doc = forum
        .service
        .register_user("Hedy", "Hedy Lamarr", "frequency-hopping", Role::User)
        .await
        .unwrap();
    let stored = doc.as_user().unwrap();
    assert!(stored.credential_hash.starts_with("$argon2"));
    assert_ne!(stored.credential_hash, "frequency-hopping");

    // usernames match case-insensitively at sign-in
    let profile = forum
        .service
        .authenticate("hedy", "frequency-hopping")
        .await
        .unwrap();
    assert_eq!(profile.id, doc.id);
    assert_eq!(profile.username, "Hedy");
    assert_eq!(profile.role, Role::User);

    let err = assert_err!(forum.service.authenticate("hedy", "wrong").await);
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn deleted_user_cannot_authenticate() {
    let forum = Forum::start().await;
    let caller = forum.user("temp").await;
    forum
        .service
        .delete_document(caller.require_id().unwrap(), Role::Admin)
        .await
        .unwrap();
    let err = assert_err!(
        forum
            .service
            .authenticate("temp", integration_tests::PASSWORD)
            .await
    );
    assert!(matches!(err, DomainError::Forbidden(_)));
}

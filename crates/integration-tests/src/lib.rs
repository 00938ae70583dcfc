//! Shared fixtures for the scenario tests: a forum over the in-memory
//! adapters plus helpers that create documents through the service.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use domains::{
    Caller, CredentialHasher, Document, DocumentId, DomainResult, NewChannel, NewDocument, NewPost,
    NewReply, Role,
};
use services::{ForumDeps, ForumOptions, ForumService, ViewRegistry};
use storage_adapters::{MemoryDocumentStore, MemoryImageStore};

pub const PASSWORD: &str = "correct horse battery staple";

/// Installs a test-writer subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Reversible stand-in for argon2 so scenario tests stay fast.
#[derive(Debug, Default)]
pub struct PlainHasher;

#[async_trait]
impl CredentialHasher for PlainHasher {
    async fn hash(&self, password: &str) -> DomainResult<String> {
        Ok(format!("plain:{password}"))
    }

    async fn verify(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix("plain:") == Some(password)
    }
}

pub struct Forum {
    pub service: ForumService,
    pub store: Arc<MemoryDocumentStore>,
    pub images: Arc<MemoryImageStore>,
}

impl Forum {
    pub async fn start() -> Self {
        Self::start_with(MemoryDocumentStore::new(), ForumOptions::default()).await
    }

    pub async fn start_with(store: MemoryDocumentStore, options: ForumOptions) -> Self {
        Self::start_with_hasher(store, options, Arc::new(PlainHasher)).await
    }

    pub async fn start_with_hasher(
        store: MemoryDocumentStore,
        options: ForumOptions,
        credentials: Arc<dyn CredentialHasher>,
    ) -> Self {
        init_tracing();
        let store = Arc::new(store);
        let images = Arc::new(MemoryImageStore::new());
        let deps = ForumDeps {
            store: store.clone(),
            images: images.clone(),
            credentials,
        };
        let service = ForumService::start(deps, ViewRegistry::standard(), options)
            .await
            .expect("forum service starts over an in-memory store");
        Self {
            service,
            store,
            images,
        }
    }

    pub async fn user(&self, username: &str) -> Caller {
        let doc = self
            .service
            .register_user(username, &capitalize(username), PASSWORD, Role::User)
            .await
            .expect("user registers");
        Caller::user(doc.id)
    }

    pub async fn admin(&self, username: &str) -> Caller {
        let doc = self
            .service
            .register_user(username, &capitalize(username), PASSWORD, Role::Admin)
            .await
            .expect("admin registers");
        Caller::admin(doc.id)
    }

    pub async fn channel(&self, caller: &Caller, name: &str) -> Document {
        self.service
            .create_document(NewDocument::Channel(NewChannel { name: name.into() }), caller)
            .await
            .expect("channel created")
    }

    pub async fn post(&self, caller: &Caller, channel_id: DocumentId, title: &str, body: &str) -> Document {
        self.service
            .create_document(
                NewDocument::Post(NewPost {
                    channel_id,
                    title: title.into(),
                    body: body.into(),
                    image: None,
                }),
                caller,
            )
            .await
            .expect("post created")
    }

    pub async fn reply(&self, caller: &Caller, parent_id: DocumentId, body: &str) -> Document {
        self.service
            .create_document(
                NewDocument::Reply(NewReply {
                    parent_id,
                    body: body.into(),
                    image: None,
                }),
                caller,
            )
            .await
            .expect("reply created")
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

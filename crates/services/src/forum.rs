//! # ForumService
//!
//! The operation surface callers use: document lifecycle, view queries,
//! thread reconstruction, voting and search. Referential checks that need
//! other documents live here; the store only validates a payload on its own.

use std::sync::Arc;

use bytes::Bytes;
use domains::{
    Caller, Channel, CredentialHasher, Document, DocumentId, DocumentKind, DocumentStore,
    DomainError, DomainResult, ImageRef, ImageStore, ImageUpload, NewChannel, NewDocument,
    NewPost, NewReply, NewUser, Payload, Post, Reply, ResultItem, Role, SearchMode, User,
    UserProfile, VoteTally, VoteType, Votes,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::search::{username_key, SearchFacade, DEFAULT_RANKING_LIMIT};
use crate::thread::{Thread, ThreadSnapshot};
use crate::views::{
    RebuildReport, ViewEngine, ViewKey, ViewQuery, ViewRegistry, ViewRow, CHANNELS_BY_ID,
    POSTS_BY_CHANNEL, REPLIES_BY_PARENT, USERS_BY_ID, USERS_BY_USERNAME,
};
use crate::votes::{VoteLedger, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_MAX_THREAD_DEPTH: usize = 512;

/// Tunables, mapped from the binary's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForumOptions {
    pub vote_max_attempts: usize,
    pub max_thread_depth: usize,
    pub ranking_limit: usize,
}

impl Default for ForumOptions {
    fn default() -> Self {
        Self {
            vote_max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_thread_depth: DEFAULT_MAX_THREAD_DEPTH,
            ranking_limit: DEFAULT_RANKING_LIMIT,
        }
    }
}

/// The collaborators the service is assembled from.
#[derive(Clone)]
pub struct ForumDeps {
    pub store: Arc<dyn DocumentStore>,
    pub images: Arc<dyn ImageStore>,
    pub credentials: Arc<dyn CredentialHasher>,
}

pub struct ForumService {
    store: Arc<dyn DocumentStore>,
    images: Arc<dyn ImageStore>,
    credentials: Arc<dyn CredentialHasher>,
    engine: Arc<ViewEngine>,
    ledger: VoteLedger,
    search: SearchFacade,
    options: ForumOptions,
    /// Serializes the username uniqueness check with the user insert.
    registration: Mutex<()>,
}

impl ForumService {
    /// Subscribes the view engine to the store, then builds every view from
    /// the current store contents.
    pub async fn start(
        deps: ForumDeps,
        registry: ViewRegistry,
        options: ForumOptions,
    ) -> DomainResult<Self> {
        let engine = Arc::new(ViewEngine::new(&registry));
        deps.store.subscribe(engine.clone());
        let report = engine.rebuild_all(deps.store.as_ref()).await?;
        info!(
            views = report.views,
            documents = report.documents,
            "forum service started"
        );

        Ok(Self {
            ledger: VoteLedger::new(deps.store.clone(), options.vote_max_attempts),
            search: SearchFacade::new(engine.clone(), options.ranking_limit),
            store: deps.store,
            images: deps.images,
            credentials: deps.credentials,
            engine,
            options,
            registration: Mutex::new(()),
        })
    }

    pub fn engine(&self) -> &Arc<ViewEngine> {
        &self.engine
    }

    pub fn options(&self) -> &ForumOptions {
        &self.options
    }

    /// Drops and recomputes every view from the store.
    pub async fn rebuild_views(&self) -> DomainResult<RebuildReport> {
        self.engine.rebuild_all(self.store.as_ref()).await
    }

    pub async fn create_document(&self, new: NewDocument, caller: &Caller) -> DomainResult<Document> {
        // 1. Validation: fields that need no other documents
        new.validate()?;

        // 2. Referential checks and persistence per kind
        let doc = match new {
            NewDocument::Post(post) => self.create_post(post, caller).await?,
            NewDocument::Reply(reply) => self.create_reply(reply, caller).await?,
            NewDocument::Channel(channel) => self.create_channel(channel, caller).await?,
            NewDocument::User(user) => {
                if user.role == Role::Admin && caller.role != Role::Admin {
                    return Err(DomainError::forbidden("only admins may create admin users"));
                }
                self.create_user(user).await?
            }
        };

        info!(doc = %doc.id, kind = %doc.kind(), "document created");
        Ok(doc)
    }

    async fn create_post(&self, post: NewPost, caller: &Caller) -> DomainResult<Document> {
        let (author_id, author_display_name) = self.author(caller).await?;
        self.require_kind(post.channel_id, "channel", |kind| kind == DocumentKind::Channel)
            .await?;
        let image_ref = self.store_image(post.image).await?;

        self.store
            .create(Payload::Post(Post {
                channel_id: post.channel_id,
                title: post.title,
                body: post.body,
                author_id,
                author_display_name,
                image_ref,
                votes: Votes::default(),
            }))
            .await
    }

    async fn create_reply(&self, reply: NewReply, caller: &Caller) -> DomainResult<Document> {
        let (author_id, author_display_name) = self.author(caller).await?;
        self.require_kind(reply.parent_id, "parent", |kind| kind.is_repliable())
            .await?;
        let image_ref = self.store_image(reply.image).await?;

        self.store
            .create(Payload::Reply(Reply {
                parent_id: reply.parent_id,
                body: reply.body,
                author_id,
                author_display_name,
                image_ref,
                votes: Votes::default(),
            }))
            .await
    }

    async fn create_channel(&self, channel: NewChannel, caller: &Caller) -> DomainResult<Document> {
        let (creator_id, _) = self.author(caller).await?;
        self.store
            .create(Payload::Channel(Channel {
                name: channel.name.trim().to_string(),
                creator_id,
            }))
            .await
    }

    async fn create_user(&self, user: NewUser) -> DomainResult<Document> {
        let _guard = self.registration.lock().await;
        if self.find_user(&user.username).await?.is_some() {
            return Err(DomainError::conflict(
                &user.username,
                "username is already taken",
            ));
        }
        self.store
            .create(Payload::User(User {
                username: user.username,
                display_name: user.display_name,
                credential_hash: user.credential_hash,
                role: user.role,
            }))
            .await
    }

    /// Hashes `password` and creates the user. Trusted path: the role is not
    /// checked against a caller.
    pub async fn register_user(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
        role: Role,
    ) -> DomainResult<Document> {
        if password.is_empty() {
            return Err(DomainError::validation("missing field `password`"));
        }
        let mut new = NewUser {
            username: username.trim().to_string(),
            display_name: display_name.trim().to_string(),
            credential_hash: String::new(),
            role,
        };
        NewDocument::User(new.clone()).validate()?;

        new.credential_hash = self.credentials.hash(password).await?;
        let doc = self.create_user(new).await?;
        info!(user = %doc.id, role = ?role, "user registered");
        Ok(doc)
    }

    /// Checks a username/password pair. Any mismatch is `Forbidden` without
    /// saying which part was wrong.
    pub async fn authenticate(&self, username: &str, password: &str) -> DomainResult<UserProfile> {
        let denied = || DomainError::forbidden("invalid username or password");

        let profile = self.find_user(username).await?.ok_or_else(denied)?;
        let doc = match self.store.get(profile.id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => return Err(denied()),
            Err(e) => return Err(e),
        };
        let user = doc.as_user().ok_or_else(denied)?;
        if !self.credentials.verify(password, &user.credential_hash).await {
            debug!(user = %profile.id, "credential check failed");
            return Err(denied());
        }
        Ok(profile)
    }

    /// Looks a user up by username, case-insensitively.
    pub async fn find_user(&self, username: &str) -> DomainResult<Option<UserProfile>> {
        let rows = self
            .engine
            .query(USERS_BY_USERNAME, &ViewQuery::key(username_key(username.trim())))
            .await?;
        rows.first().map(ViewRow::decode).transpose()
    }

    pub async fn get_document(&self, id: DocumentId) -> DomainResult<Document> {
        self.store.get(id).await
    }

    /// Removes a document without touching its dependents.
    pub async fn delete_document(&self, id: DocumentId, caller_role: Role) -> DomainResult<()> {
        if caller_role != Role::Admin {
            return Err(DomainError::forbidden("deleting documents requires the admin role"));
        }
        let tombstone = self.store.delete(id).await?;
        info!(doc = %id, kind = %tombstone.kind(), "document deleted");
        Ok(())
    }

    pub async fn query_view(&self, name: &str, query: &ViewQuery) -> DomainResult<Vec<ViewRow>> {
        self.engine.query(name, query).await
    }

    /// Snapshots the reply view and returns the thread under `root_id`, which
    /// must be a post or a reply.
    pub async fn reconstruct_thread(&self, root_id: DocumentId) -> DomainResult<Thread> {
        let root = self.store.get(root_id).await?;
        if !root.kind().is_repliable() {
            return Err(DomainError::validation(format!(
                "a thread cannot be rooted at a {}",
                root.kind()
            )));
        }
        let rows = self
            .engine
            .query(REPLIES_BY_PARENT, &ViewQuery::all())
            .await?;
        let snapshot = ThreadSnapshot::from_rows(&rows, self.options.max_thread_depth)?;
        Ok(Thread::new(root, snapshot))
    }

    pub async fn apply_vote(
        &self,
        document_id: DocumentId,
        voter: DocumentId,
        vote: VoteType,
    ) -> DomainResult<VoteTally> {
        self.ledger.apply_vote(document_id, voter, vote).await
    }

    pub async fn retract_vote(&self, document_id: DocumentId, voter: DocumentId) -> DomainResult<VoteTally> {
        self.ledger.retract_vote(document_id, voter).await
    }

    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        channel: Option<DocumentId>,
    ) -> DomainResult<Vec<ResultItem>> {
        self.search.search(mode, query, channel).await
    }

    pub async fn list_channels(&self) -> DomainResult<Vec<Document>> {
        self.documents_in(CHANNELS_BY_ID, &ViewQuery::all()).await
    }

    /// Posts of one channel in creation order.
    pub async fn list_posts(&self, channel_id: DocumentId) -> DomainResult<Vec<Document>> {
        let query = ViewQuery::key(ViewKey::single(channel_id.to_string()));
        self.documents_in(POSTS_BY_CHANNEL, &query).await
    }

    pub async fn list_replies(&self) -> DomainResult<Vec<Document>> {
        self.documents_in(REPLIES_BY_PARENT, &ViewQuery::all()).await
    }

    pub async fn list_users(&self, caller_role: Role) -> DomainResult<Vec<UserProfile>> {
        if caller_role != Role::Admin {
            return Err(DomainError::forbidden("listing users requires the admin role"));
        }
        self.engine
            .query(USERS_BY_ID, &ViewQuery::all())
            .await?
            .iter()
            .map(ViewRow::decode)
            .collect()
    }

    pub async fn load_image(&self, image_ref: &ImageRef) -> DomainResult<Bytes> {
        self.images.load(image_ref).await
    }

    async fn documents_in(&self, view: &str, query: &ViewQuery) -> DomainResult<Vec<Document>> {
        self.engine
            .query(view, query)
            .await?
            .iter()
            .map(ViewRow::decode)
            .collect()
    }

    /// Resolves the caller to an existing user: `(id, display name)`.
    async fn author(&self, caller: &Caller) -> DomainResult<(DocumentId, String)> {
        let id = caller.require_id()?;
        let doc = match self.store.get(id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => {
                return Err(DomainError::validation(format!("unknown author {id}")));
            }
            Err(e) => return Err(e),
        };
        match doc.as_user() {
            Some(user) => Ok((id, user.display_name.clone())),
            None => Err(DomainError::validation(format!("{id} is not a user"))),
        }
    }

    /// `NotFound` when `id` is absent, `Validation` when it names a document
    /// whose kind fails `accepts`.
    async fn require_kind(
        &self,
        id: DocumentId,
        role: &'static str,
        accepts: impl Fn(DocumentKind) -> bool,
    ) -> DomainResult<Document> {
        let doc = match self.store.get(id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => return Err(DomainError::not_found(role, id)),
            Err(e) => return Err(e),
        };
        if !accepts(doc.kind()) {
            return Err(DomainError::validation(format!(
                "{id} is a {}, not a valid {role}",
                doc.kind()
            )));
        }
        Ok(doc)
    }

    async fn store_image(&self, upload: Option<ImageUpload>) -> DomainResult<Option<ImageRef>> {
        match upload {
            Some(upload) => Ok(Some(self.images.save(upload).await?)),
            None => Ok(None),
        }
    }
}

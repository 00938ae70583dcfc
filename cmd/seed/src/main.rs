//! # threadbase seed
//!
//! Operational entry point: loads settings, opens the snapshot-backed store,
//! makes sure the administrator exists, fills an empty forum with demo
//! content, logs the author rankings and writes the snapshot back.

use std::sync::Arc;

use anyhow::Context;
use auth_adapters::Argon2Hasher;
use configs::{LogFormat, Settings};
use domains::{
    Caller, DocumentId, DocumentStore, ImageStore, NewChannel, NewDocument, NewPost, NewReply,
    Role, SearchMode, VoteType,
};
use services::{ForumDeps, ForumOptions, ForumService, ViewRegistry};
use storage_adapters::{JsonSnapshot, LocalImageStore, MemoryDocumentStore, MemoryImageStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings);

    // 1. Storage: documents from the snapshot (if any), images on disk or in memory
    let snapshot = settings.store.snapshot_path.clone().map(JsonSnapshot::new);
    let documents = match &snapshot {
        Some(snapshot) => snapshot.load().await.context("loading snapshot")?,
        None => Vec::new(),
    };
    let store = Arc::new(MemoryDocumentStore::from_documents(documents));
    let images: Arc<dyn ImageStore> = match &settings.store.image_dir {
        Some(dir) => Arc::new(LocalImageStore::new(dir)),
        None => Arc::new(MemoryImageStore::new()),
    };

    // 2. Core: views are rebuilt from whatever the store holds
    let deps = ForumDeps {
        store: store.clone(),
        images,
        credentials: Arc::new(Argon2Hasher::new()),
    };
    let forum = ForumService::start(deps, ViewRegistry::standard(), forum_options(&settings))
        .await
        .context("starting forum service")?;

    // 3. Bootstrap: administrator account and demo content
    let admin = ensure_admin(&forum, &settings).await?;
    if forum.list_channels().await?.is_empty() {
        match admin {
            Some(admin) => seed_demo(&forum, admin).await?,
            None => warn!("forum is empty but no admin password is configured; skipping demo content"),
        }
    }

    // 4. Report
    for (view, rows) in forum.engine().row_counts().await {
        info!(view = %view, rows, "view ready");
    }
    for item in forum.search(SearchMode::MostPosts, "", None).await? {
        if let Some(ranking) = item.as_ranking() {
            info!(user = %ranking.username, posts = ranking.count, "ranking");
        }
    }

    // 5. Persist
    if let Some(snapshot) = &snapshot {
        snapshot
            .save(&store.all_documents().await?)
            .await
            .context("saving snapshot")?;
    }
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn forum_options(settings: &Settings) -> ForumOptions {
    ForumOptions {
        vote_max_attempts: settings.votes.max_attempts,
        max_thread_depth: settings.threads.max_depth,
        ranking_limit: settings.search.ranking_limit,
    }
}

/// Creates the configured administrator when a password is set and the
/// account does not exist yet.
async fn ensure_admin(forum: &ForumService, settings: &Settings) -> anyhow::Result<Option<Caller>> {
    let Some(password) = settings.admin.password() else {
        return Ok(None);
    };
    let username = &settings.admin.username;
    if let Some(existing) = forum.find_user(username).await? {
        if existing.role != Role::Admin {
            anyhow::bail!("configured admin `{username}` exists without the admin role");
        }
        return Ok(Some(Caller::admin(existing.id)));
    }
    let doc = forum
        .register_user(username, &settings.admin.display_name, password, Role::Admin)
        .await
        .with_context(|| format!("registering admin `{username}`"))?;
    info!(user = %doc.id, username = %username, "administrator created");
    Ok(Some(Caller::admin(doc.id)))
}

async fn seed_demo(forum: &ForumService, admin: Caller) -> anyhow::Result<()> {
    let general = create(forum, &admin, NewDocument::Channel(NewChannel { name: "general".into() })).await?;
    let welcome = create(
        forum,
        &admin,
        NewDocument::Post(NewPost {
            channel_id: general,
            title: "Welcome".into(),
            body: "Introduce yourself in the replies.".into(),
            image: None,
        }),
    )
    .await?;
    let hello = create(
        forum,
        &admin,
        NewDocument::Reply(NewReply {
            parent_id: welcome,
            body: "Hello from the admin account.".into(),
            image: None,
        }),
    )
    .await?;
    create(
        forum,
        &admin,
        NewDocument::Reply(NewReply {
            parent_id: hello,
            body: "Replies nest as deep as you like.".into(),
            image: None,
        }),
    )
    .await?;

    let voter = admin.require_id()?;
    forum.apply_vote(welcome, voter, VoteType::Up).await?;

    let thread = forum.reconstruct_thread(welcome).await?;
    info!(post = %welcome, replies = thread.replies().count(), "demo content seeded");
    Ok(())
}

async fn create(forum: &ForumService, caller: &Caller, new: NewDocument) -> anyhow::Result<DocumentId> {
    let kind = new.kind();
    let doc = forum
        .create_document(new, caller)
        .await
        .with_context(|| format!("creating demo {kind}"))?;
    Ok(doc.id)
}

//! Views agree with the store after arbitrary creates and deletes, and a
//! full rebuild reproduces the incrementally maintained state.

use std::collections::BTreeSet;

use domains::{DocumentId, DocumentStore, Role};
use integration_tests::Forum;
use services::views::{
    ViewDefinition, ViewRegistry, CHANNELS_BY_ID, POSTS_BY_CHANNEL, POST_COUNT_BY_AUTHOR,
    REPLIES_BY_PARENT, USERS_BY_ID, USERS_BY_USERNAME,
};
use services::{ViewKey, ViewQuery};

async fn posts_in(forum: &Forum, channel: DocumentId) -> BTreeSet<DocumentId> {
    forum
        .service
        .query_view(POSTS_BY_CHANNEL, &ViewQuery::key(ViewKey::single(channel.to_string())))
        .await
        .unwrap()
        .iter()
        .filter_map(|row| row.id)
        .collect()
}

async fn posts_in_store(forum: &Forum, channel: DocumentId) -> BTreeSet<DocumentId> {
    forum
        .store
        .all_documents()
        .await
        .unwrap()
        .iter()
        .filter(|doc| doc.as_post().is_some_and(|post| post.channel_id == channel))
        .map(|doc| doc.id)
        .collect()
}

#[tokio::test]
async fn posts_by_channel_matches_store_after_interleaved_writes() {
    let forum = Forum::start().await;
    let author = forum.user("writer").await;
    let channels = [
        forum.channel(&author, "north").await.id,
        forum.channel(&author, "south").await.id,
        forum.channel(&author, "east").await.id,
    ];

    let mut created = Vec::new();
    for n in 0..30 {
        let channel = channels[(n * 7) % channels.len()];
        created.push(forum.post(&author, channel, &format!("post {n}"), "body").await.id);
        if n % 4 == 3 {
            let victim = created.remove(n % created.len());
            forum
                .service
                .delete_document(victim, Role::Admin)
                .await
                .unwrap();
        }
    }

    for channel in channels {
        assert_eq!(posts_in(&forum, channel).await, posts_in_store(&forum, channel).await);
    }
}

#[tokio::test]
async fn rebuild_reproduces_incremental_views() {
    let forum = Forum::start().await;
    let a = forum.user("anna").await;
    let b = forum.user("ben").await;
    let channel = forum.channel(&a, "general").await;
    let post = forum.post(&a, channel.id, "root", "text").await;
    let reply = forum.reply(&b, post.id, "first").await;
    forum.reply(&a, reply.id, "second").await;
    forum.post(&b, channel.id, "another", "text").await;

    let views = [
        POSTS_BY_CHANNEL,
        REPLIES_BY_PARENT,
        CHANNELS_BY_ID,
        USERS_BY_USERNAME,
        USERS_BY_ID,
    ];
    let mut before = Vec::new();
    for view in views {
        before.push(forum.service.query_view(view, &ViewQuery::all()).await.unwrap());
    }
    let counts_before = forum
        .service
        .query_view(POST_COUNT_BY_AUTHOR, &ViewQuery::all().grouped())
        .await
        .unwrap();

    let report = forum.service.rebuild_views().await.unwrap();
    assert_eq!(report.documents, forum.store.len());

    for (view, rows) in views.iter().zip(before) {
        assert_eq!(
            forum.service.query_view(view, &ViewQuery::all()).await.unwrap(),
            rows,
            "{view}"
        );
    }
    assert_eq!(
        forum
            .service
            .query_view(POST_COUNT_BY_AUTHOR, &ViewQuery::all().grouped())
            .await
            .unwrap(),
        counts_before
    );
}

#[tokio::test]
async fn votes_refresh_view_values() {
    let forum = Forum::start().await;
    let author = forum.user("vera").await;
    let channel = forum.channel(&author, "polls").await;
    let post = forum.post(&author, channel.id, "poll", "vote").await;
    let voter = author.require_id().unwrap();

    forum
        .service
        .apply_vote(post.id, voter, domains::VoteType::Up)
        .await
        .unwrap();

    let rows = forum
        .service
        .query_view(POSTS_BY_CHANNEL, &ViewQuery::key(ViewKey::single(channel.id.to_string())))
        .await
        .unwrap();
    let indexed: domains::Document = rows[0].decode().unwrap();
    assert_eq!(indexed.votes().unwrap().tally().upvotes, 1);
    assert!(indexed.revision > post.revision);
}

#[tokio::test]
async fn new_view_version_rebuilds_from_store() {
    fn posts_by_title(
        doc: &domains::Document,
    ) -> Result<Vec<(ViewKey, serde_json::Value)>, services::views::MapError> {
        Ok(doc
            .as_post()
            .map(|post| vec![(ViewKey::single(post.title.clone()), serde_json::json!(1))])
            .unwrap_or_default())
    }

    let forum = Forum::start().await;
    let author = forum.user("tom").await;
    let channel = forum.channel(&author, "general").await;
    forum.post(&author, channel.id, "zebra", "x").await;
    forum.post(&author, channel.id, "apple", "x").await;

    let standard = ViewRegistry::standard();
    let same = standard.get(POSTS_BY_CHANNEL).unwrap().clone();
    assert!(!forum.service.engine().install(same, forum.store.as_ref()).await.unwrap());

    let changed = ViewDefinition::new(POSTS_BY_CHANNEL, 2, posts_by_title);
    assert!(forum.service.engine().install(changed, forum.store.as_ref()).await.unwrap());
    let keys: Vec<_> = forum
        .service
        .query_view(POSTS_BY_CHANNEL, &ViewQuery::all())
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.key)
        .collect();
    assert_eq!(keys, vec![ViewKey::single("apple"), ViewKey::single("zebra")]);

    // later writes flow through the new definition
    forum.post(&author, channel.id, "mango", "x").await;
    let rows = forum
        .service
        .query_view(POSTS_BY_CHANNEL, &ViewQuery::all())
        .await
        .unwrap();
    assert_eq!(rows[1].key, ViewKey::single("mango"));
}

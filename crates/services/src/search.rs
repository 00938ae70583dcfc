//! # SearchFacade
//!
//! Content search, author search and author rankings, composed from view
//! reads only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domains::{
    ContentHit, Document, DocumentId, DomainError, DomainResult, Payload, ResultItem, SearchMode,
    UserProfile, UserRanking,
};
use tracing::debug;

use crate::views::{
    ViewEngine, ViewKey, ViewQuery, CHANNELS_BY_ID, POSTS_BY_CHANNEL, POST_COUNT_BY_AUTHOR,
    REPLIES_BY_PARENT, REPLY_COUNT_BY_AUTHOR, USERS_BY_ID, USERS_BY_USERNAME,
};

pub const DEFAULT_RANKING_LIMIT: usize = 10;

/// Longest parent chain followed when resolving a reply's channel.
const MAX_PARENT_HOPS: usize = 4096;

pub struct SearchFacade {
    engine: Arc<ViewEngine>,
    ranking_limit: usize,
}

/// Posts and replies as read from the views in one pass.
struct ContentScan {
    posts: Vec<Document>,
    replies: Vec<Document>,
    channel_names: HashMap<DocumentId, String>,
}

/// Follows parent pointers up to the owning post's channel.
fn channel_of<'a>(doc: &'a Document, parents: &HashMap<DocumentId, &'a Document>) -> Option<DocumentId> {
    let mut current = doc;
    for _ in 0..MAX_PARENT_HOPS {
        match &current.payload {
            Payload::Post(post) => return Some(post.channel_id),
            Payload::Reply(reply) => current = *parents.get(&reply.parent_id)?,
            Payload::Channel(_) | Payload::User(_) => return None,
        }
    }
    None
}

impl ContentScan {
    /// Index order: posts in `posts_by_channel` order, then replies in
    /// `replies_by_parent` order.
    fn hits(
        self,
        channel: Option<DocumentId>,
        mut matches: impl FnMut(&Document) -> bool,
    ) -> Vec<ResultItem> {
        let parents: HashMap<DocumentId, &Document> = self
            .posts
            .iter()
            .chain(self.replies.iter())
            .map(|doc| (doc.id, doc))
            .collect();

        let mut hits = Vec::new();
        for doc in self.posts.iter().chain(self.replies.iter()) {
            let owner = channel_of(doc, &parents);
            if channel.is_some() && owner != channel {
                continue;
            }
            if !matches(doc) {
                continue;
            }
            hits.push(ResultItem::Content(ContentHit {
                document: doc.clone(),
                channel_name: owner.and_then(|id| self.channel_names.get(&id).cloned()),
            }));
        }
        hits
    }
}

impl SearchFacade {
    pub fn new(engine: Arc<ViewEngine>, ranking_limit: usize) -> Self {
        Self {
            engine,
            ranking_limit,
        }
    }

    /// `query` is ignored by the ranking modes. `channel` narrows content and
    /// author search to one channel.
    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        channel: Option<DocumentId>,
    ) -> DomainResult<Vec<ResultItem>> {
        let results = match mode {
            SearchMode::Content => self.content(query, channel).await?,
            SearchMode::User => self.by_author(query, channel).await?,
            SearchMode::MostPosts => self.ranking(POST_COUNT_BY_AUTHOR, true).await?,
            SearchMode::LeastPosts => self.ranking(POST_COUNT_BY_AUTHOR, false).await?,
            SearchMode::MostReplies => self.ranking(REPLY_COUNT_BY_AUTHOR, true).await?,
            SearchMode::LeastReplies => self.ranking(REPLY_COUNT_BY_AUTHOR, false).await?,
        };
        debug!(mode = %mode, results = results.len(), "search finished");
        Ok(results)
    }

    async fn content(&self, query: &str, channel: Option<DocumentId>) -> DomainResult<Vec<ResultItem>> {
        let needle = required_query(query)?.to_lowercase();
        let scan = self.scan().await?;
        Ok(scan.hits(channel, |doc| {
            doc.payload
                .searchable_text()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        }))
    }

    async fn by_author(&self, query: &str, channel: Option<DocumentId>) -> DomainResult<Vec<ResultItem>> {
        let prefix = required_query(query)?.to_lowercase();
        let rows = self
            .engine
            .query(USERS_BY_USERNAME, &ViewQuery::prefix(prefix))
            .await?;
        let authors: HashSet<DocumentId> = rows
            .iter()
            .map(|row| row.decode::<UserProfile>().map(|profile| profile.id))
            .collect::<DomainResult<_>>()?;
        if authors.is_empty() {
            return Ok(Vec::new());
        }

        let scan = self.scan().await?;
        Ok(scan.hits(channel, |doc| {
            doc.payload
                .author_id()
                .is_some_and(|author| authors.contains(&author))
        }))
    }

    /// Every known user with their count in `view`, zero included, sorted by
    /// count with username order breaking ties.
    async fn ranking(&self, view: &str, most_first: bool) -> DomainResult<Vec<ResultItem>> {
        let counts: HashMap<DocumentId, u64> = self
            .engine
            .query(view, &ViewQuery::all().grouped())
            .await?
            .into_iter()
            .filter_map(|row| {
                let author = row.key.first_id()?;
                let count = row.value.as_u64()?;
                Some((author, count))
            })
            .collect();

        let mut rankings: Vec<UserRanking> = self
            .engine
            .query(USERS_BY_ID, &ViewQuery::all())
            .await?
            .iter()
            .map(|row| row.decode::<UserProfile>())
            .map(|profile| {
                profile.map(|p| UserRanking {
                    count: counts.get(&p.id).copied().unwrap_or(0),
                    user_id: p.id,
                    username: p.username,
                    display_name: p.display_name,
                })
            })
            .collect::<DomainResult<_>>()?;

        rankings.sort_by(|a, b| {
            a.username
                .to_lowercase()
                .cmp(&b.username.to_lowercase())
                .then_with(|| a.username.cmp(&b.username))
        });
        if most_first {
            rankings.sort_by(|a, b| b.count.cmp(&a.count));
        } else {
            rankings.sort_by_key(|r| r.count);
        }
        rankings.truncate(self.ranking_limit);
        Ok(rankings.into_iter().map(ResultItem::Ranking).collect())
    }

    async fn scan(&self) -> DomainResult<ContentScan> {
        let posts = self
            .engine
            .query(POSTS_BY_CHANNEL, &ViewQuery::all())
            .await?
            .iter()
            .map(|row| row.decode::<Document>())
            .collect::<DomainResult<Vec<_>>>()?;
        let replies = self
            .engine
            .query(REPLIES_BY_PARENT, &ViewQuery::all())
            .await?
            .iter()
            .map(|row| row.decode::<Document>())
            .collect::<DomainResult<Vec<_>>>()?;
        let channel_names = self
            .engine
            .query(CHANNELS_BY_ID, &ViewQuery::all())
            .await?
            .iter()
            .map(|row| {
                let doc: Document = row.decode()?;
                let name = doc.as_channel().map(|c| c.name.clone()).unwrap_or_default();
                Ok((doc.id, name))
            })
            .collect::<DomainResult<HashMap<_, _>>>()?;
        Ok(ContentScan {
            posts,
            replies,
            channel_names,
        })
    }
}

fn required_query(query: &str) -> DomainResult<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("search query must not be blank"));
    }
    Ok(trimmed)
}

/// Convenience for callers holding only a username key.
pub fn username_key(username: &str) -> ViewKey {
    ViewKey::single(username.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::ViewRegistry;
    use domains::{
        Change, ChangeListener, Channel, Post, Reply, Revision, Role, User, Votes,
    };

    struct Fixture {
        engine: Arc<ViewEngine>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: Arc::new(ViewEngine::new(&ViewRegistry::standard())),
            }
        }

        async fn add(&self, payload: Payload) -> Document {
            let doc = Document {
                id: DocumentId::generate(),
                revision: Revision::initial(),
                created_at: chrono::Utc::now(),
                payload,
            };
            self.engine.on_change(&Change::Upsert(doc.clone())).await;
            doc
        }

        async fn remove(&self, doc: &Document) {
            let mut tombstone = doc.clone();
            tombstone.revision = tombstone.revision.next();
            self.engine.on_change(&Change::Delete(tombstone)).await;
        }

        async fn user(&self, username: &str) -> Document {
            self.add(Payload::User(User {
                username: username.into(),
                display_name: username.to_uppercase(),
                credential_hash: "hash".into(),
                role: Role::User,
            }))
            .await
        }

        async fn channel(&self, name: &str, creator: DocumentId) -> Document {
            self.add(Payload::Channel(Channel {
                name: name.into(),
                creator_id: creator,
            }))
            .await
        }

        async fn post(&self, channel: DocumentId, author: DocumentId, title: &str, body: &str) -> Document {
            self.add(Payload::Post(Post {
                channel_id: channel,
                title: title.into(),
                body: body.into(),
                author_id: author,
                author_display_name: "Author".into(),
                image_ref: None,
                votes: Votes::default(),
            }))
            .await
        }

        async fn reply(&self, parent: DocumentId, author: DocumentId, body: &str) -> Document {
            self.add(Payload::Reply(Reply {
                parent_id: parent,
                body: body.into(),
                author_id: author,
                author_display_name: "Author".into(),
                image_ref: None,
                votes: Votes::default(),
            }))
            .await
        }

        fn facade(&self) -> SearchFacade {
            SearchFacade::new(self.engine.clone(), DEFAULT_RANKING_LIMIT)
        }
    }

    fn ids(items: &[ResultItem]) -> Vec<DocumentId> {
        items.iter().map(ResultItem::id).collect()
    }

    #[tokio::test]
    async fn content_search_is_case_insensitive_and_annotated() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let c1 = fx.channel("General", alice.id).await;
        let p1 = fx.post(c1.id, alice.id, "Hello", "World").await;
        let r1 = fx.reply(p1.id, alice.id, "Hi").await;
        let r2 = fx.reply(r1.id, alice.id, "Hi again").await;

        let results = fx.facade().search(SearchMode::Content, "hI", None).await.unwrap();
        assert_eq!(ids(&results), vec![r1.id, r2.id]);
        for item in &results {
            assert_eq!(item.as_content().unwrap().channel_name.as_deref(), Some("General"));
        }

        let results = fx.facade().search(SearchMode::Content, "hello wor", None).await.unwrap();
        assert_eq!(ids(&results), vec![p1.id]);
    }

    #[tokio::test]
    async fn channel_filter_applies_to_nested_replies() {
        let fx = Fixture::new();
        let bob = fx.user("bob").await;
        let c1 = fx.channel("one", bob.id).await;
        let c2 = fx.channel("two", bob.id).await;
        let p1 = fx.post(c1.id, bob.id, "rust", "news").await;
        let p2 = fx.post(c2.id, bob.id, "rust", "tips").await;
        let deep = fx.reply(p2.id, bob.id, "more rust").await;
        let deeper = fx.reply(deep.id, bob.id, "rust again").await;

        let facade = fx.facade();
        let in_c2 = facade.search(SearchMode::Content, "rust", Some(c2.id)).await.unwrap();
        assert_eq!(ids(&in_c2), vec![p2.id, deep.id, deeper.id]);
        let all = facade.search(SearchMode::Content, "rust", None).await.unwrap();
        assert_eq!(ids(&all), vec![p1.id, p2.id, deep.id, deeper.id]);
    }

    #[tokio::test]
    async fn repeated_search_is_identical() {
        let fx = Fixture::new();
        let u = fx.user("carol").await;
        let c = fx.channel("c", u.id).await;
        for n in 0..5 {
            fx.post(c.id, u.id, &format!("topic {n}"), "same words").await;
        }
        let facade = fx.facade();
        let first = facade.search(SearchMode::Content, "words", None).await.unwrap();
        let second = facade.search(SearchMode::Content, "words", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let fx = Fixture::new();
        let err = fx.facade().search(SearchMode::Content, "   ", None).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn author_search_matches_username_prefix() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let alfred = fx.user("Alfred").await;
        let bob = fx.user("bob").await;
        let c = fx.channel("c", bob.id).await;
        let a_post = fx.post(c.id, alice.id, "by alice", "x").await;
        fx.post(c.id, bob.id, "by bob", "x").await;
        let f_reply = fx.reply(a_post.id, alfred.id, "by alfred").await;

        let results = fx.facade().search(SearchMode::User, "AL", None).await.unwrap();
        assert_eq!(ids(&results), vec![a_post.id, f_reply.id]);

        let none = fx.facade().search(SearchMode::User, "zed", None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn rankings_include_zero_counts_and_break_ties_by_username() {
        let fx = Fixture::new();
        let dave = fx.user("dave").await;
        let carol = fx.user("carol").await;
        let erin = fx.user("erin").await;
        let c = fx.channel("c", dave.id).await;
        fx.post(c.id, dave.id, "1", "x").await;
        fx.post(c.id, dave.id, "2", "x").await;
        fx.post(c.id, carol.id, "3", "x").await;
        fx.post(c.id, erin.id, "4", "x").await;

        let facade = fx.facade();
        let most = facade.search(SearchMode::MostPosts, "", None).await.unwrap();
        let names: Vec<_> = most
            .iter()
            .map(|r| {
                let r = r.as_ranking().unwrap();
                (r.username.clone(), r.count)
            })
            .collect();
        assert_eq!(
            names,
            vec![("dave".into(), 2), ("carol".into(), 1), ("erin".into(), 1)]
        );

        let least = facade.search(SearchMode::LeastReplies, "", None).await.unwrap();
        let names: Vec<_> = least
            .iter()
            .map(|r| r.as_ranking().unwrap().username.clone())
            .collect();
        assert_eq!(names, vec!["carol", "dave", "erin"]);
    }

    #[tokio::test]
    async fn rankings_truncate_and_skip_deleted_users() {
        let fx = Fixture::new();
        let mut users = Vec::new();
        for n in 0..12 {
            users.push(fx.user(&format!("user{n:02}")).await);
        }
        fx.remove(&users[0]).await;

        let results = fx.facade().search(SearchMode::MostPosts, "", None).await.unwrap();
        assert_eq!(results.len(), DEFAULT_RANKING_LIMIT);
        assert_eq!(results[0].as_ranking().unwrap().username, "user01");
    }

    #[test]
    fn username_key_is_lowercase() {
        assert_eq!(username_key("MiXeD"), ViewKey::single("mixed"));
    }
}

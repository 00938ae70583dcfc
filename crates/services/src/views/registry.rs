//! View definitions and the registry the engine is built from.

use domains::{Document, Payload, UserProfile};
use serde_json::{json, Value};
use thiserror::Error;

use super::key::ViewKey;

pub const POSTS_BY_CHANNEL: &str = "posts_by_channel";
pub const REPLIES_BY_PARENT: &str = "replies_by_parent";
pub const CHANNELS_BY_ID: &str = "channels_by_id";
pub const USERS_BY_USERNAME: &str = "users_by_username";
pub const USERS_BY_ID: &str = "users_by_id";
pub const POST_COUNT_BY_AUTHOR: &str = "post_count_by_author";
pub const REPLY_COUNT_BY_AUTHOR: &str = "reply_count_by_author";

/// A map function could not project a document.
#[derive(Debug, Error)]
#[error("map failed: {0}")]
pub struct MapError(String);

impl MapError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

pub type Emitted = Vec<(ViewKey, Value)>;

/// Pure and deterministic: one document in, zero or more rows out.
pub type MapFn = fn(&Document) -> Result<Emitted, MapError>;

/// Deterministic and associative over the values sharing a key.
pub type ReduceFn = fn(&[&Value]) -> Value;

#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub name: String,
    /// Bumped whenever `map` or `reduce` changes; a new version forces a rebuild.
    pub version: u32,
    pub map: MapFn,
    pub reduce: Option<ReduceFn>,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>, version: u32, map: MapFn) -> Self {
        Self {
            name: name.into(),
            version,
            map,
            reduce: None,
        }
    }

    pub fn with_reduce(mut self, reduce: ReduceFn) -> Self {
        self.reduce = Some(reduce);
        self
    }
}

/// Table of view name to definition, built once at startup and handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    definitions: Vec<ViewDefinition>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `definition`, replacing any view of the same name.
    pub fn with(mut self, definition: ViewDefinition) -> Self {
        self.definitions.retain(|d| d.name != definition.name);
        self.definitions.push(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ViewDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The views the forum queries.
    pub fn standard() -> Self {
        Self::new()
            .with(ViewDefinition::new(POSTS_BY_CHANNEL, 1, map_posts_by_channel))
            .with(ViewDefinition::new(REPLIES_BY_PARENT, 1, map_replies_by_parent))
            .with(ViewDefinition::new(CHANNELS_BY_ID, 1, map_channels_by_id))
            .with(ViewDefinition::new(USERS_BY_USERNAME, 1, map_users_by_username))
            .with(ViewDefinition::new(USERS_BY_ID, 1, map_users_by_id))
            .with(
                ViewDefinition::new(POST_COUNT_BY_AUTHOR, 1, map_post_authors)
                    .with_reduce(reduce_sum),
            )
            .with(
                ViewDefinition::new(REPLY_COUNT_BY_AUTHOR, 1, map_reply_authors)
                    .with_reduce(reduce_sum),
            )
    }
}

/// Sums integer values; non-numeric values count as zero.
pub fn reduce_sum(values: &[&Value]) -> Value {
    let total: i64 = values.iter().filter_map(|v| v.as_i64()).sum();
    json!(total)
}

pub fn reduce_count(values: &[&Value]) -> Value {
    json!(values.len())
}

fn map_posts_by_channel(doc: &Document) -> Result<Emitted, MapError> {
    match &doc.payload {
        Payload::Post(post) => Ok(vec![(
            ViewKey::pair(post.channel_id.to_string(), doc.id.to_string()),
            serde_json::to_value(doc)?,
        )]),
        _ => Ok(Vec::new()),
    }
}

fn map_replies_by_parent(doc: &Document) -> Result<Emitted, MapError> {
    match &doc.payload {
        Payload::Reply(reply) => Ok(vec![(
            ViewKey::single(reply.parent_id.to_string()),
            serde_json::to_value(doc)?,
        )]),
        _ => Ok(Vec::new()),
    }
}

fn map_channels_by_id(doc: &Document) -> Result<Emitted, MapError> {
    match &doc.payload {
        Payload::Channel(_) => Ok(vec![(
            ViewKey::single(doc.id.to_string()),
            serde_json::to_value(doc)?,
        )]),
        _ => Ok(Vec::new()),
    }
}

/// Keyed by lowercased username so prefix search is case-insensitive.
fn map_users_by_username(doc: &Document) -> Result<Emitted, MapError> {
    match UserProfile::from_document(doc) {
        Some(profile) => Ok(vec![(
            ViewKey::single(profile.username.to_lowercase()),
            serde_json::to_value(&profile)?,
        )]),
        None => Ok(Vec::new()),
    }
}

fn map_users_by_id(doc: &Document) -> Result<Emitted, MapError> {
    match UserProfile::from_document(doc) {
        Some(profile) => Ok(vec![(
            ViewKey::single(doc.id.to_string()),
            serde_json::to_value(&profile)?,
        )]),
        None => Ok(Vec::new()),
    }
}

fn map_post_authors(doc: &Document) -> Result<Emitted, MapError> {
    match &doc.payload {
        Payload::Post(post) => Ok(vec![(ViewKey::single(post.author_id.to_string()), json!(1))]),
        _ => Ok(Vec::new()),
    }
}

fn map_reply_authors(doc: &Document) -> Result<Emitted, MapError> {
    match &doc.payload {
        Payload::Reply(reply) => Ok(vec![(ViewKey::single(reply.author_id.to_string()), json!(1))]),
        _ => Ok(Vec::new()),
    }
}

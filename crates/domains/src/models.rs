//! # Domain Models
//!
//! Posts, replies, channels and users share one document store. Each record is a
//! [`Document`] envelope around a [`Payload`] tagged by kind. Ids are UUID v7, so
//! id order is creation order.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::validation;

/// Globally unique, immutable document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Lowest id; lower bound for index range scans.
    pub const MIN: Self = Self(Uuid::nil());
    /// Highest id; upper bound for index range scans.
    pub const MAX: Self = Self(Uuid::from_u128(u128::MAX));

    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for DocumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::validation(format!("`{s}` is not a document id")))
    }
}

/// Opaque version token. Bumped on every mutation, including deletion, so a
/// later revision always orders after an earlier one for the same document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub const fn initial() -> Self {
        Self(1)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to image bytes held by the image collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::validation(format!("unknown role `{other}`"))),
        }
    }
}

/// Discriminant of [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Post,
    Reply,
    Channel,
    User,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply => "reply",
            Self::Channel => "channel",
            Self::User => "user",
        }
    }

    /// Posts and replies: the kinds a reply's `parentId` may reference.
    pub fn is_repliable(&self) -> bool {
        matches!(self, Self::Post | Self::Reply)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "reply" | "response" => Ok(Self::Reply),
            "channel" => Ok(Self::Channel),
            "user" => Ok(Self::User),
            other => Err(DomainError::validation(format!("unknown document kind `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    #[serde(alias = "upvote")]
    Up,
    #[serde(alias = "downvote")]
    Down,
}

impl FromStr for VoteType {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "upvote" => Ok(Self::Up),
            "down" | "downvote" => Ok(Self::Down),
            other => Err(DomainError::validation(format!("unknown vote type `{other}`"))),
        }
    }
}

/// Vote sets on a post or reply.
///
/// A voter appears in at most one of the two sets. The fields are private so
/// the only way to change them is [`Votes::cast`] and [`Votes::retract`], which
/// keep that invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    #[serde(default)]
    upvoters: BTreeSet<DocumentId>,
    #[serde(default)]
    downvoters: BTreeSet<DocumentId>,
}

impl Votes {
    /// Clears any previous vote by `voter`, then records the new one.
    pub fn cast(&mut self, voter: DocumentId, vote: VoteType) {
        self.retract(voter);
        match vote {
            VoteType::Up => self.upvoters.insert(voter),
            VoteType::Down => self.downvoters.insert(voter),
        };
    }

    /// Removes `voter` from both sets. Returns whether a vote was present.
    pub fn retract(&mut self, voter: DocumentId) -> bool {
        let up = self.upvoters.remove(&voter);
        let down = self.downvoters.remove(&voter);
        up || down
    }

    pub fn vote_of(&self, voter: &DocumentId) -> Option<VoteType> {
        if self.upvoters.contains(voter) {
            Some(VoteType::Up)
        } else if self.downvoters.contains(voter) {
            Some(VoteType::Down)
        } else {
            None
        }
    }

    pub fn upvoters(&self) -> &BTreeSet<DocumentId> {
        &self.upvoters
    }

    pub fn downvoters(&self) -> &BTreeSet<DocumentId> {
        &self.downvoters
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            upvotes: self.upvoters.len(),
            downvotes: self.downvoters.len(),
        }
    }
}

/// Post-mutation counts returned to voters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: usize,
    pub downvotes: usize,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub channel_id: DocumentId,
    pub title: String,
    pub body: String,
    pub author_id: DocumentId,
    pub author_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRef>,
    #[serde(default)]
    pub votes: Votes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// A post or another reply.
    pub parent_id: DocumentId,
    pub body: String,
    pub author_id: DocumentId,
    pub author_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRef>,
    #[serde(default)]
    pub votes: Votes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub creator_id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub credential_hash: String,
    #[serde(default)]
    pub role: Role,
}

/// Kind-specific body of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Post(Post),
    Reply(Reply),
    Channel(Channel),
    User(User),
}

impl Payload {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Post(_) => DocumentKind::Post,
            Self::Reply(_) => DocumentKind::Reply,
            Self::Channel(_) => DocumentKind::Channel,
            Self::User(_) => DocumentKind::User,
        }
    }

    pub fn votes(&self) -> Option<&Votes> {
        match self {
            Self::Post(post) => Some(&post.votes),
            Self::Reply(reply) => Some(&reply.votes),
            Self::Channel(_) | Self::User(_) => None,
        }
    }

    /// Votes are the only field that may change after creation.
    pub fn votes_mut(&mut self) -> Option<&mut Votes> {
        match self {
            Self::Post(post) => Some(&mut post.votes),
            Self::Reply(reply) => Some(&mut reply.votes),
            Self::Channel(_) | Self::User(_) => None,
        }
    }

    pub fn author_id(&self) -> Option<DocumentId> {
        match self {
            Self::Post(post) => Some(post.author_id),
            Self::Reply(reply) => Some(reply.author_id),
            Self::Channel(channel) => Some(channel.creator_id),
            Self::User(_) => None,
        }
    }

    /// Text matched by content search: `title + body` for posts, `body` for replies.
    pub fn searchable_text(&self) -> Option<String> {
        match self {
            Self::Post(post) => Some(format!("{} {}", post.title, post.body)),
            Self::Reply(reply) => Some(reply.body.clone()),
            Self::Channel(_) | Self::User(_) => None,
        }
    }

    /// Checks presence and size limits of the required fields.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::Post(post) => {
                validation::require_text("title", &post.title, validation::MAX_TITLE_CHARS)?;
                validation::require_body("body", &post.body)?;
                validation::require_text(
                    "authorDisplayName",
                    &post.author_display_name,
                    validation::MAX_DISPLAY_NAME_CHARS,
                )
            }
            Self::Reply(reply) => {
                validation::require_body("body", &reply.body)?;
                validation::require_text(
                    "authorDisplayName",
                    &reply.author_display_name,
                    validation::MAX_DISPLAY_NAME_CHARS,
                )
            }
            Self::Channel(channel) => {
                validation::require_text("name", &channel.name, validation::MAX_CHANNEL_NAME_CHARS)
            }
            Self::User(user) => {
                validation::validate_username(&user.username)?;
                validation::require_text(
                    "displayName",
                    &user.display_name,
                    validation::MAX_DISPLAY_NAME_CHARS,
                )?;
                if user.credential_hash.is_empty() {
                    return Err(DomainError::validation("missing field `credentialHash`"));
                }
                Ok(())
            }
        }
    }
}

/// Versioned envelope shared by every record in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub revision: Revision,
    pub created_at: DateTime<Utc>,
    pub payload: Payload,
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        self.payload.kind()
    }

    pub fn votes(&self) -> Option<&Votes> {
        self.payload.votes()
    }

    pub fn as_post(&self) -> Option<&Post> {
        match &self.payload {
            Payload::Post(post) => Some(post),
            _ => None,
        }
    }

    pub fn as_reply(&self) -> Option<&Reply> {
        match &self.payload {
            Payload::Reply(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match &self.payload {
            Payload::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match &self.payload {
            Payload::User(user) => Some(user),
            _ => None,
        }
    }
}

/// A user as exposed to other users and admins; never carries the credential hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: DocumentId,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Option<Self> {
        doc.as_user().map(|user| Self {
            id: doc.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        })
    }
}

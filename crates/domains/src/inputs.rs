//! # Inputs
//!
//! What callers hand to the core: a trusted identity and the fields of a new
//! document. Ids, revisions, timestamps and author names are assigned by the core.

use bytes::Bytes;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::{DomainError, DomainResult};
use crate::models::{DocumentId, DocumentKind, Role};
use crate::validation;

/// Identity supplied by the session collaborator. The core trusts it as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Option<DocumentId>,
    pub role: Role,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            role: Role::User,
        }
    }

    pub fn user(id: DocumentId) -> Self {
        Self {
            id: Some(id),
            role: Role::User,
        }
    }

    pub fn admin(id: DocumentId) -> Self {
        Self {
            id: Some(id),
            role: Role::Admin,
        }
    }

    pub fn require_id(&self) -> DomainResult<DocumentId> {
        self.id
            .ok_or_else(|| DomainError::validation("a caller identity is required"))
    }
}

/// Raw image bytes attached to a new post or reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: Mime,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, content_type: Mime) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.content_type.type_() != mime::IMAGE {
            return Err(DomainError::validation(format!(
                "`{}` is not an image content type",
                self.content_type
            )));
        }
        if self.bytes.is_empty() {
            return Err(DomainError::validation("image upload is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub channel_id: DocumentId,
    pub title: String,
    pub body: String,
    #[serde(skip)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReply {
    pub parent_id: DocumentId,
    pub body: String,
    #[serde(skip)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannel {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub credential_hash: String,
    #[serde(default)]
    pub role: Role,
}

/// Fields of a document about to be created.
#[derive(Debug, Clone, PartialEq)]
pub enum NewDocument {
    Post(NewPost),
    Reply(NewReply),
    Channel(NewChannel),
    User(NewUser),
}

impl NewDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Post(_) => DocumentKind::Post,
            Self::Reply(_) => DocumentKind::Reply,
            Self::Channel(_) => DocumentKind::Channel,
            Self::User(_) => DocumentKind::User,
        }
    }

    /// Parses a loosely-typed payload for `kind`. Missing or mistyped fields
    /// become a validation error naming the field.
    pub fn from_json(kind: DocumentKind, payload: serde_json::Value) -> DomainResult<Self> {
        Ok(match kind {
            DocumentKind::Post => Self::Post(parse(kind, payload)?),
            DocumentKind::Reply => Self::Reply(parse(kind, payload)?),
            DocumentKind::Channel => Self::Channel(parse(kind, payload)?),
            DocumentKind::User => Self::User(parse(kind, payload)?),
        })
    }

    /// Field checks that need no other documents.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::Post(post) => {
                validation::require_text("title", &post.title, validation::MAX_TITLE_CHARS)?;
                validation::require_body("body", &post.body)?;
                post.image.as_ref().map_or(Ok(()), ImageUpload::validate)
            }
            Self::Reply(reply) => {
                validation::require_body("body", &reply.body)?;
                reply.image.as_ref().map_or(Ok(()), ImageUpload::validate)
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
                )
            }
        }
    }
}

fn parse<T: DeserializeOwned>(kind: DocumentKind, payload: serde_json::Value) -> DomainResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| DomainError::validation(format!("invalid {kind} payload: {e}")))
}

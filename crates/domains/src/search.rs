//! Search modes and result shapes returned by the query facade.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::models::{Document, DocumentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Case-insensitive substring over post and reply text
    Content,
    /// Content written by users whose username starts with the query
    User,
    MostPosts,
    LeastPosts,
    #[serde(alias = "highest-ranking")]
    MostReplies,
    #[serde(alias = "lowest-ranking")]
    LeastReplies,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::User => "user",
            Self::MostPosts => "most-posts",
            Self::LeastPosts => "least-posts",
            Self::MostReplies => "most-replies",
            Self::LeastReplies => "least-replies",
        }
    }

    pub fn is_ranking(&self) -> bool {
        !matches!(self, Self::Content | Self::User)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(Self::Content),
            "user" => Ok(Self::User),
            "most-posts" => Ok(Self::MostPosts),
            "least-posts" => Ok(Self::LeastPosts),
            "most-replies" | "highest-ranking" => Ok(Self::MostReplies),
            "least-replies" | "lowest-ranking" => Ok(Self::LeastReplies),
            other => Err(DomainError::validation(format!("unknown search mode `{other}`"))),
        }
    }
}

/// A matching post or reply, annotated with the name of the channel it lives in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentHit {
    pub document: Document,
    pub channel_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRanking {
    pub user_id: DocumentId,
    pub username: String,
    pub display_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultItem {
    Content(ContentHit),
    Ranking(UserRanking),
}

impl ResultItem {
    pub fn as_content(&self) -> Option<&ContentHit> {
        match self {
            Self::Content(hit) => Some(hit),
            Self::Ranking(_) => None,
        }
    }

    pub fn as_ranking(&self) -> Option<&UserRanking> {
        match self {
            Self::Ranking(ranking) => Some(ranking),
            Self::Content(_) => None,
        }
    }

    /// The document id for content hits, the user id for rankings.
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Content(hit) => hit.document.id,
            Self::Ranking(ranking) => ranking.user_id,
        }
    }
}

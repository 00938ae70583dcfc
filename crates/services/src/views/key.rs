//! View keys and query options.

use std::fmt;

use domains::{DocumentId, DomainError, DomainResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sorts after every character used in ordinary text, so `prefix + MAX_SENTINEL`
/// is an inclusive upper bound for every string that starts with `prefix`.
pub const MAX_SENTINEL: char = '\u{fff0}';

/// A view key: a tuple of string components ordered lexicographically,
/// component by component. Single-field keys are one-component tuples.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewKey(Vec<String>);

impl ViewKey {
    pub fn single(part: impl Into<String>) -> Self {
        Self(vec![part.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The first component parsed as a document id, for views keyed by id.
    pub fn first_id(&self) -> Option<DocumentId> {
        self.first().and_then(|part| part.parse().ok())
    }

    /// True when this key's leading components equal all of `prefix`'s.
    pub fn starts_with(&self, prefix: &ViewKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Inclusive upper bound for keys whose last component starts with this
    /// key's last component.
    pub fn prefix_end(&self) -> Self {
        let mut parts = self.0.clone();
        match parts.last_mut() {
            Some(last) => last.push(MAX_SENTINEL),
            None => parts.push(MAX_SENTINEL.to_string()),
        }
        Self(parts)
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// One output row. `id` is the emitting document, absent on reduced rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    pub key: ViewKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub value: Value,
}

impl ViewRow {
    /// Decodes the row value, e.g. back into the `Document` a view emitted.
    pub fn decode<T: DeserializeOwned>(&self) -> DomainResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            DomainError::Internal(format!("row {} of a view is not decodable: {e}", self.key))
        })
    }
}

/// Selection and shaping of view rows.
///
/// `key` matches every row whose key starts with the given components, so a
/// one-component key filters a tuple-keyed view by its first field.
/// `start_key`/`end_key` bound a range, both inclusive; `key` wins when both
/// are set. `group` reduces per distinct key, `reduce` to a single total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub key: Option<ViewKey>,
    pub start_key: Option<ViewKey>,
    pub end_key: Option<ViewKey>,
    pub group: bool,
    pub reduce: bool,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ViewQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn key(key: ViewKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn range(start: ViewKey, end: ViewKey) -> Self {
        Self {
            start_key: Some(start),
            end_key: Some(end),
            ..Self::default()
        }
    }

    /// Rows whose single-component key starts with `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let start = ViewKey::single(prefix);
        let end = start.prefix_end();
        Self::range(start, end)
    }

    pub fn grouped(mut self) -> Self {
        self.group = true;
        self
    }

    pub fn reduced(mut self) -> Self {
        self.reduce = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn wants_reduce(&self) -> bool {
        self.group || self.reduce
    }
}

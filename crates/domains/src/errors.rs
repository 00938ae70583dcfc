//! # DomainError
//!
//! Centralized error handling for threadbase.
//! Every port and service returns these; transport layers map them to responses.

use thiserror::Error;

/// The primary error type for all document, view and vote operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input (caller's fault, never retried by the core)
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced document, view or blob is absent
    #[error("{kind} not found with ID {id}")]
    NotFound { kind: &'static str, id: String },

    /// Optimistic-concurrency collision on a revision check
    #[error("conflict on {id}: {reason}")]
    Conflict { id: String, reason: String },

    /// Caller lacks the role an operation requires
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Underlying store unreachable or I/O failed
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A collaborator failed unexpectedly (e.g. a blocking task panicked)
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn storage(message: impl ToString) -> Self {
        Self::StorageUnavailable(message.to_string())
    }

    /// True when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::StorageUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A specialized Result type for threadbase logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(DomainError::conflict("a", "stale").is_transient());
        assert!(DomainError::storage("disk gone").is_transient());
        assert!(!DomainError::validation("title").is_transient());
        assert!(!DomainError::not_found("document", "x").is_transient());
    }

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = DomainError::not_found("channel", "c-1");
        assert_eq!(err.to_string(), "channel not found with ID c-1");
    }
}

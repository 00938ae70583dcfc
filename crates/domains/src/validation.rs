//! Field limits and the checks shared by payload and input validation.

use crate::errors::{DomainError, DomainResult};

/// Maximum length for a post title in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum size for a post or reply body in bytes (100 KB).
pub const MAX_BODY_BYTES: usize = 100 * 1024;

pub const MAX_CHANNEL_NAME_CHARS: usize = 64;
pub const MAX_USERNAME_CHARS: usize = 32;
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Non-blank text of at most `max_chars` characters.
pub fn require_text(field: &str, value: &str, max_chars: usize) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("missing field `{field}`")));
    }
    if value.chars().count() > max_chars {
        return Err(DomainError::validation(format!(
            "`{field}` exceeds maximum length of {max_chars} characters"
        )));
    }
    Ok(())
}

/// Non-blank body of at most [`MAX_BODY_BYTES`].
pub fn require_body(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("missing field `{field}`")));
    }
    if value.len() > MAX_BODY_BYTES {
        return Err(DomainError::validation(format!(
            "`{field}` exceeds maximum size of {MAX_BODY_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Usernames are 1-32 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> DomainResult<()> {
    require_text("username", username, MAX_USERNAME_CHARS)?;
    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(DomainError::validation(format!(
            "`username` contains invalid character `{bad}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_missing() {
        let err = require_text("title", "   ", MAX_TITLE_CHARS).unwrap_err();
        assert_eq!(err, DomainError::validation("missing field `title`"));
    }

    #[test]
    fn title_limit_counts_characters_not_bytes() {
        let title = "é".repeat(MAX_TITLE_CHARS);
        assert!(require_text("title", &title, MAX_TITLE_CHARS).is_ok());
        let too_long = "é".repeat(MAX_TITLE_CHARS + 1);
        assert!(require_text("title", &too_long, MAX_TITLE_CHARS).is_err());
    }

    #[test]
    fn body_limit_is_in_bytes() {
        assert!(require_body("body", &"a".repeat(MAX_BODY_BYTES)).is_ok());
        assert!(require_body("body", &"a".repeat(MAX_BODY_BYTES + 1)).is_err());
    }

    #[test]
    fn username_charset() {
        assert!(validate_username("alice_01.b-c").is_ok());
        assert!(validate_username("alice bob").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(MAX_USERNAME_CHARS + 1)).is_err());
    }
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::UserId;
use crate::error::{ForumError, Result};

/// Public profile attached 1:1 to an auth identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    /// Stored but not updated by any forum operation.
    pub reputation: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Checks a username and returns its trimmed form.
///
/// Usernames are 3 to 32 characters of ASCII letters, digits, `_` or `-`.
pub fn validate_username(username: &str) -> Result<&str> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ForumError::validation("username", "cannot be empty"));
    }
    if !(3..=32).contains(&trimmed.len()) {
        return Err(ForumError::validation(
            "username",
            "must be between 3 and 32 characters",
        ));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ForumError::validation(
            "username",
            "may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(trimmed)
}

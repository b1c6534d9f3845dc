//! Error taxonomy for forum operations.
//!
//! A refused acceptance is not an error: `accept_answer` reports it as
//! `Ok(false)` so callers can tell "not permitted" apart from a failure.

use thiserror::Error;

/// Errors returned by the forum service.
#[derive(Debug, Error)]
pub enum ForumError {
    /// The action needs a signed-in user and the session has none.
    #[error("authentication required")]
    AuthRequired,

    /// Input rejected before any database work.
    #[error("{field} {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The write collides with existing data the caller can change.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure (connection, constraint, I/O).
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ForumError {
    pub(crate) fn validation(field: &'static str, reason: &'static str) -> Self {
        Self::Validation { field, reason }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for errors caused by the caller's input or session rather than
    /// the backend.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired | Self::Validation { .. } | Self::NotFound { .. } | Self::Conflict(_)
        )
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ForumError>;

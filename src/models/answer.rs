use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::OffsetDateTime;

use super::{AnswerId, QuestionId, UserId};
use crate::error::{ForumError, Result};

/// An answer to a question.
///
/// `is_accepted` mirrors `Question::accepted_answer_id`; the two are written
/// together by the acceptance transaction and never independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub author_id: UserId,
    pub content: String,
    pub vote_count: i64,
    pub is_accepted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Rejects blank answer bodies before any database work.
pub fn validate_answer_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(ForumError::validation("content", "cannot be empty"));
    }
    Ok(())
}

/// Display order for an answer thread.
///
/// Accepted answer first, then highest score, then oldest. Ties on the
/// second-resolution timestamp fall back to insertion order.
pub fn answer_display_order(a: &Answer, b: &Answer) -> Ordering {
    b.is_accepted
        .cmp(&a.is_accepted)
        .then_with(|| b.vote_count.cmp(&a.vote_count))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

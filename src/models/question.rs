use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{AnswerId, QuestionId, UserId};
use crate::error::{ForumError, Result};

/// A question with its cached counters and tag names.
///
/// `vote_count` and `answer_count` are caches over the vote ledger and the
/// answers table; they are only ever changed by atomic increments inside the
/// transaction that mutates their source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub vote_count: i64,
    pub view_count: i64,
    pub answer_count: i64,
    pub accepted_answer_id: Option<AnswerId>,
    /// When an answer was accepted. Stays set if that answer is later deleted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub accepted_at: Option<OffsetDateTime>,
    /// Normalised tag names, alphabetical.
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Question {
    /// True while the author can still accept an answer.
    ///
    /// A question whose accepted answer was deleted has no accepted answer
    /// but is still closed.
    pub fn is_open(&self) -> bool {
        self.accepted_at.is_none()
    }
}

/// Builder for constructing `Question` instances with optional fields.
///
/// # Examples
///
/// ```
/// use qna::{QuestionBuilder, QuestionId, UserId};
///
/// let question = QuestionBuilder::new()
///     .id(QuestionId::new(1))
///     .title("How do lifetimes work?")
///     .content("I keep fighting the borrow checker.")
///     .author_id(UserId::random())
///     .build();
///
/// assert_eq!(question.vote_count, 0);
/// assert!(question.tags.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct QuestionBuilder {
    id: Option<QuestionId>,
    title: Option<String>,
    content: Option<String>,
    author_id: Option<UserId>,
    vote_count: i64,
    view_count: i64,
    answer_count: i64,
    accepted_answer_id: Option<AnswerId>,
    accepted_at: Option<OffsetDateTime>,
    tags: Vec<String>,
    created_at: Option<OffsetDateTime>,
}

impl QuestionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: QuestionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn author_id(mut self, author_id: UserId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn vote_count(mut self, vote_count: i64) -> Self {
        self.vote_count = vote_count;
        self
    }

    pub fn view_count(mut self, view_count: i64) -> Self {
        self.view_count = view_count;
        self
    }

    pub fn answer_count(mut self, answer_count: i64) -> Self {
        self.answer_count = answer_count;
        self
    }

    pub fn accepted_answer_id(mut self, accepted_answer_id: Option<AnswerId>) -> Self {
        self.accepted_answer_id = accepted_answer_id;
        self
    }

    pub fn accepted_at(mut self, accepted_at: Option<OffsetDateTime>) -> Self {
        self.accepted_at = accepted_at;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the `Question`, using defaults for optional fields.
    ///
    /// # Panics
    ///
    /// Panics if `id`, `title`, `content` or `author_id` have not been set.
    pub fn build(self) -> Question {
        Question {
            id: self.id.expect("id is required"),
            title: self.title.expect("title is required"),
            content: self.content.expect("content is required"),
            author_id: self.author_id.expect("author_id is required"),
            vote_count: self.vote_count,
            view_count: self.view_count,
            answer_count: self.answer_count,
            accepted_answer_id: self.accepted_answer_id,
            accepted_at: self.accepted_at,
            tags: self.tags,
            created_at: self.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}

/// Input for posting a question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl NewQuestion {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks the submission before anything touches the database.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ForumError::validation("title", "cannot be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(ForumError::validation("content", "cannot be empty"));
        }
        if self.tags.iter().all(|t| t.trim().is_empty()) {
            return Err(ForumError::validation("tags", "at least one tag is required"));
        }
        Ok(())
    }
}

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use super::ForumService;
use super::profiles::ensure_profile;
use super::tags::get_or_create_tag_in;
use crate::db::{self, optional_unix_time, unix_time};
use crate::error::{ForumError, Result};
use crate::models::{NewQuestion, Question, QuestionBuilder, QuestionId, UserId, normalize_tag};
use crate::session::Session;

const QUESTION_COLUMNS: &str = "q.id, q.title, q.content, q.author_id, q.vote_count, \
     q.view_count, q.answer_count, q.accepted_answer_id, q.accepted_at, q.created_at";

/// Sort order for question listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOrder {
    /// Most recently asked first.
    #[default]
    Newest,
    Oldest,
    /// Highest score first, newest among equals.
    MostVoted,
}

impl QuestionOrder {
    fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "q.created_at DESC, q.id DESC",
            Self::Oldest => "q.created_at ASC, q.id ASC",
            Self::MostVoted => "q.vote_count DESC, q.created_at DESC, q.id DESC",
        }
    }
}

/// Options for listing questions.
#[derive(Debug, Clone, Default)]
pub struct ListQuestionsOptions {
    /// Maximum number of questions to return (None = all).
    pub limit: Option<usize>,
    /// Only questions carrying this tag (normalised before matching).
    pub tag: Option<String>,
    pub order: QuestionOrder,
    /// Only questions that can still accept an answer.
    pub open_only: bool,
}

/// Maps a row selected with `QUESTION_COLUMNS`; tags are loaded separately.
fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(QuestionBuilder::new()
        .id(row.get(0)?)
        .title(row.get::<_, String>(1)?)
        .content(row.get::<_, String>(2)?)
        .author_id(row.get(3)?)
        .vote_count(row.get(4)?)
        .view_count(row.get(5)?)
        .answer_count(row.get(6)?)
        .accepted_answer_id(row.get(7)?)
        .accepted_at(optional_unix_time(row, 8)?)
        .created_at(unix_time(row, 9)?)
        .build())
}

/// Tag names linked to a question, alphabetically.
fn question_tags(conn: &Connection, question_id: QuestionId) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM question_tags qt
         JOIN tags t ON t.id = qt.tag_id
         WHERE qt.question_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([question_id], |row| row.get(0))?;
    rows.collect()
}

fn load_question(conn: &Connection, id: QuestionId) -> rusqlite::Result<Option<Question>> {
    let question = conn
        .query_row(
            &format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = ?1"),
            [id],
            question_from_row,
        )
        .optional()?;

    match question {
        Some(mut question) => {
            question.tags = question_tags(conn, id)?;
            Ok(Some(question))
        }
        None => Ok(None),
    }
}

impl ForumService {
    /// Posts a question for the signed-in user.
    ///
    /// Title and content are trimmed; tags are normalised and deduplicated.
    /// The question row, any new tags, the tag links and the usage counters
    /// are written in one transaction, so a failure leaves nothing behind.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService, NewQuestion, Session, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    /// let user = UserId::random();
    /// service.create_profile(user, "asker", "")?;
    ///
    /// let question = service.post_question(
    ///     &Session::signed_in(user),
    ///     &NewQuestion::new("Lifetimes?", "What does 'a mean?", ["Rust", "rust", "lifetimes"]),
    /// )?;
    /// assert_eq!(question.tags, vec!["lifetimes", "rust"]);
    /// assert_eq!(question.vote_count, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn post_question(&self, session: &Session, input: &NewQuestion) -> Result<Question> {
        let user = session.require_user()?;
        input.validate()?;

        let tag_names: BTreeSet<String> = input
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();

        let question = self.db.write_transaction(|conn| -> Result<Question> {
            ensure_profile(conn, user)?;

            let now = db::now();
            conn.execute(
                "INSERT INTO questions (title, content, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    input.title.trim(),
                    input.content.trim(),
                    user,
                    now.unix_timestamp()
                ],
            )?;
            let id = QuestionId::new(conn.last_insert_rowid());

            for name in &tag_names {
                let tag_id = get_or_create_tag_in(conn, name)?;
                conn.execute(
                    "INSERT INTO question_tags (question_id, tag_id) VALUES (?1, ?2)",
                    params![id, tag_id],
                )?;
                conn.execute(
                    "UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?1",
                    [tag_id],
                )?;
            }

            Ok(QuestionBuilder::new()
                .id(id)
                .title(input.title.trim())
                .content(input.content.trim())
                .author_id(user)
                .tags(question_tags(conn, id)?)
                .created_at(now)
                .build())
        })?;

        tracing::debug!(
            question = %question.id,
            author = %user,
            tags = question.tags.len(),
            "posted question"
        );
        Ok(question)
    }

    /// Retrieves a question with its tag names. Missing questions are `None`.
    pub fn get_question(&self, id: QuestionId) -> Result<Option<Question>> {
        Ok(load_question(self.db.connection(), id)?)
    }

    /// Counts a page view and returns the question as stored afterwards.
    pub fn view_question(&self, id: QuestionId) -> Result<Question> {
        self.increment_view_count(id)?;
        self.get_question(id)?
            .ok_or_else(|| ForumError::not_found("question", id))
    }

    /// Adds one to a question's view counter.
    ///
    /// Not idempotent: every call counts. Unknown ids are ignored.
    pub fn increment_view_count(&self, id: QuestionId) -> Result<()> {
        self.db.write_transaction(|conn| -> Result<()> {
            conn.execute(
                "UPDATE questions SET view_count = view_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    /// Lists questions with optional filtering, ordering and limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService, ListQuestionsOptions, NewQuestion, QuestionOrder, Session, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    /// let user = UserId::random();
    /// service.create_profile(user, "asker", "")?;
    /// let session = Session::signed_in(user);
    /// service.post_question(&session, &NewQuestion::new("One", "first", ["rust"]))?;
    /// service.post_question(&session, &NewQuestion::new("Two", "second", ["sql"]))?;
    ///
    /// let options = ListQuestionsOptions {
    ///     tag: Some("Rust".to_string()),
    ///     order: QuestionOrder::Oldest,
    ///     ..Default::default()
    /// };
    /// let questions = service.list_questions(&options)?;
    /// assert_eq!(questions.len(), 1);
    /// assert_eq!(questions[0].title, "One");
    /// # Ok(())
    /// # }
    /// ```
    pub fn list_questions(&self, options: &ListQuestionsOptions) -> Result<Vec<Question>> {
        let conn = self.db.connection();

        let mut sql = format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE 1 = 1");
        if options.tag.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM question_tags qt JOIN tags t ON t.id = qt.tag_id
                              WHERE qt.question_id = q.id AND t.name = ?1 COLLATE NOCASE)",
            );
        }
        if options.open_only {
            sql.push_str(" AND q.accepted_at IS NULL");
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(options.order.order_by());
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut questions = match &options.tag {
            Some(tag) => stmt
                .query_map([normalize_tag(tag)], question_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], question_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        for question in &mut questions {
            question.tags = question_tags(conn, question.id)?;
        }
        Ok(questions)
    }

    /// Questions asked by `author`, newest first.
    pub fn questions_by_author(&self, author: UserId) -> Result<Vec<Question>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions q
             WHERE q.author_id = ?1
             ORDER BY q.created_at DESC, q.id DESC"
        ))?;
        let mut questions = stmt
            .query_map([author], question_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for question in &mut questions {
            question.tags = question_tags(conn, question.id)?;
        }
        Ok(questions)
    }
}

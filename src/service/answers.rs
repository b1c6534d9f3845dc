use rusqlite::{OptionalExtension, Row, params};

use super::ForumService;
use super::notifications::notify;
use super::profiles::ensure_profile;
use crate::db::{self, unix_time};
use crate::error::{ForumError, Result};
use crate::models::{
    Answer, AnswerId, NotificationKind, QuestionId, UserId, answer_display_order,
    validate_answer_content,
};
use crate::session::Session;

const ANSWER_COLUMNS: &str = "id, question_id, author_id, content, vote_count, is_accepted, created_at";

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<Answer> {
    Ok(Answer {
        id: row.get(0)?,
        question_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        vote_count: row.get(4)?,
        is_accepted: row.get(5)?,
        created_at: unix_time(row, 6)?,
    })
}

impl ForumService {
    /// Posts an answer to `question_id` for the signed-in user.
    ///
    /// Blank content is rejected before the database is touched. The insert,
    /// the question's `answer_count` bump and the asker's notification commit
    /// together.
    pub fn post_answer(
        &self,
        session: &Session,
        question_id: QuestionId,
        content: &str,
    ) -> Result<Answer> {
        let user = session.require_user()?;
        validate_answer_content(content)?;
        let content = content.trim();

        let answer = self.db.write_transaction(|conn| -> Result<Answer> {
            ensure_profile(conn, user)?;

            let asker: Option<UserId> = conn
                .query_row(
                    "SELECT author_id FROM questions WHERE id = ?1",
                    [question_id],
                    |row| row.get(0),
                )
                .optional()?;
            let asker = asker.ok_or_else(|| ForumError::not_found("question", question_id))?;

            let now = db::now();
            conn.execute(
                "INSERT INTO answers (question_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![question_id, user, content, now.unix_timestamp()],
            )?;
            let id = AnswerId::new(conn.last_insert_rowid());

            conn.execute(
                "UPDATE questions SET answer_count = answer_count + 1 WHERE id = ?1",
                [question_id],
            )?;

            notify(
                conn,
                asker,
                NotificationKind::NewAnswer,
                question_id,
                Some(id),
                user,
                now,
            )?;

            Ok(Answer {
                id,
                question_id,
                author_id: user,
                content: content.to_string(),
                vote_count: 0,
                is_accepted: false,
                created_at: now,
            })
        })?;

        tracing::debug!(answer = %answer.id, question = %question_id, author = %user, "posted answer");
        Ok(answer)
    }

    /// Retrieves an answer by id. Missing answers are `None`.
    pub fn get_answer(&self, id: AnswerId) -> Result<Option<Answer>> {
        let answer = self
            .db
            .connection()
            .query_row(
                &format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = ?1"),
                [id],
                answer_from_row,
            )
            .optional()?;
        Ok(answer)
    }

    /// Answers to a question in display order: accepted first, then by
    /// score, then oldest first.
    pub fn list_answers(&self, question_id: QuestionId) -> Result<Vec<Answer>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE question_id = ?1"
        ))?;
        let mut answers = stmt
            .query_map([question_id], answer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        answers.sort_by(answer_display_order);
        Ok(answers)
    }
}

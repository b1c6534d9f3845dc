use rusqlite::params;

use super::ForumService;
use super::notifications::notify;
use crate::db;
use crate::error::Result;
use crate::models::{AnswerId, NotificationKind, QuestionId, UserId};
use crate::session::Session;

impl ForumService {
    /// Marks `answer_id` as the accepted answer of `question_id`.
    ///
    /// Returns `Ok(false)` without changing anything when the caller is not
    /// the question's author, the question already has an accepted answer,
    /// or the answer belongs to a different question. All three conditions
    /// are part of a single conditional `UPDATE`, so of two racing calls on
    /// one question exactly one can succeed.
    ///
    /// Acceptance is final. It stamps `accepted_at`, which nothing clears, so
    /// the question stays closed even if the accepted answer is later removed
    /// along with its author's profile.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService, NewQuestion, Session, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    /// let asker = UserId::random();
    /// let helper = UserId::random();
    /// service.create_profile(asker, "asker", "")?;
    /// service.create_profile(helper, "helper", "")?;
    ///
    /// let question = service.post_question(
    ///     &Session::signed_in(asker),
    ///     &NewQuestion::new("Title", "Body", ["rust"]),
    /// )?;
    /// let answer = service.post_answer(&Session::signed_in(helper), question.id, "Use Rc")?;
    ///
    /// // Only the asker may accept
    /// assert!(!service.accept_answer(&Session::signed_in(helper), question.id, answer.id)?);
    /// assert!(service.accept_answer(&Session::signed_in(asker), question.id, answer.id)?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn accept_answer(
        &self,
        session: &Session,
        question_id: QuestionId,
        answer_id: AnswerId,
    ) -> Result<bool> {
        let requester = session.require_user()?;

        let accepted = self.db.write_transaction(|conn| -> Result<bool> {
            let now = db::now();
            let claimed = conn.execute(
                "UPDATE questions SET accepted_answer_id = ?1, accepted_at = ?4
                 WHERE id = ?2
                   AND author_id = ?3
                   AND accepted_at IS NULL
                   AND EXISTS (SELECT 1 FROM answers WHERE id = ?1 AND question_id = ?2)",
                params![answer_id, question_id, requester, now.unix_timestamp()],
            )?;
            if claimed == 0 {
                return Ok(false);
            }

            conn.execute(
                "UPDATE answers SET is_accepted = 1 WHERE id = ?1",
                [answer_id],
            )?;

            let answerer: UserId = conn.query_row(
                "SELECT author_id FROM answers WHERE id = ?1",
                [answer_id],
                |row| row.get(0),
            )?;
            notify(
                conn,
                answerer,
                NotificationKind::AnswerAccepted,
                question_id,
                Some(answer_id),
                requester,
                now,
            )?;
            Ok(true)
        })?;

        if accepted {
            tracing::debug!(question = %question_id, answer = %answer_id, "accepted answer");
        } else {
            tracing::debug!(
                question = %question_id,
                answer = %answer_id,
                requester = %requester,
                "acceptance refused"
            );
        }
        Ok(accepted)
    }
}

use rusqlite::{Connection, OptionalExtension, params};

use super::ForumService;
use super::profiles::ensure_profile;
use crate::db::{self, unix_time};
use crate::error::{ForumError, Result};
use crate::models::{UserId, Vote, VoteChange, VoteId, VoteOutcome, VoteTarget, VoteType};
use crate::session::Session;

/// Fails with `NotFound` unless the vote target row exists.
fn ensure_target(conn: &Connection, target: VoteTarget) -> Result<()> {
    let exists: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)",
            target.table()
        ),
        [target.row_id()],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(ForumError::not_found(target.entity(), target.row_id()));
    }
    Ok(())
}

/// The user's live ledger row for `target`, if any.
fn existing_vote(
    conn: &Connection,
    user: UserId,
    target: VoteTarget,
) -> rusqlite::Result<Option<(VoteId, VoteType)>> {
    conn.query_row(
        &format!(
            "SELECT id, vote_type FROM votes WHERE user_id = ?1 AND {} = ?2",
            target.ledger_column()
        ),
        params![user, target.row_id()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

impl ForumService {
    /// Casts, switches or retracts the signed-in user's vote on `target`.
    ///
    /// Casting the direction the user already holds removes the vote; casting
    /// the opposite direction replaces it. The ledger row and the cached
    /// `vote_count` change in one transaction, and the returned outcome
    /// carries the aggregate as committed.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService, NewQuestion, Session, UserId, VoteTarget, VoteType};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    /// let asker = UserId::random();
    /// let voter = UserId::random();
    /// service.create_profile(asker, "asker", "")?;
    /// service.create_profile(voter, "voter", "")?;
    ///
    /// let question = service.post_question(
    ///     &Session::signed_in(asker),
    ///     &NewQuestion::new("Why borrow?", "Explain the checker", ["rust"]),
    /// )?;
    /// let target = VoteTarget::Question(question.id);
    /// let session = Session::signed_in(voter);
    ///
    /// assert_eq!(service.cast_vote(&session, target, VoteType::Up)?.vote_count, 1);
    /// // Same direction again toggles the vote off
    /// assert_eq!(service.cast_vote(&session, target, VoteType::Up)?.vote_count, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn cast_vote(
        &self,
        session: &Session,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> Result<VoteOutcome> {
        let user = session.require_user()?;

        let outcome = self.db.write_transaction(|conn| -> Result<VoteOutcome> {
            ensure_profile(conn, user)?;
            ensure_target(conn, target)?;

            let existing = existing_vote(conn, user, target)?;
            let (change, delta) = VoteChange::resolve(existing.map(|(_, t)| t), vote_type);

            match (existing, change) {
                (None, _) => {
                    conn.execute(
                        &format!(
                            "INSERT INTO votes (user_id, {}, vote_type, created_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            target.ledger_column()
                        ),
                        params![
                            user,
                            target.row_id(),
                            vote_type,
                            db::now().unix_timestamp()
                        ],
                    )?;
                }
                (Some((id, _)), VoteChange::Retracted) => {
                    conn.execute("DELETE FROM votes WHERE id = ?1", [id])?;
                }
                (Some((id, _)), _) => {
                    conn.execute(
                        "UPDATE votes SET vote_type = ?1 WHERE id = ?2",
                        params![vote_type, id],
                    )?;
                }
            }

            let vote_count: i64 = conn.query_row(
                &format!(
                    "UPDATE {} SET vote_count = vote_count + ?1 WHERE id = ?2 RETURNING vote_count",
                    target.table()
                ),
                params![delta, target.row_id()],
                |row| row.get(0),
            )?;

            Ok(VoteOutcome {
                target,
                change,
                current: (change != VoteChange::Retracted).then_some(vote_type),
                vote_count,
            })
        })?;

        tracing::debug!(
            user = %user,
            %target,
            change = ?outcome.change,
            vote_count = outcome.vote_count,
            "vote recorded"
        );
        Ok(outcome)
    }

    /// Cached aggregate for `target`.
    pub fn vote_count(&self, target: VoteTarget) -> Result<i64> {
        self.db
            .connection()
            .query_row(
                &format!("SELECT vote_count FROM {} WHERE id = ?1", target.table()),
                [target.row_id()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ForumError::not_found(target.entity(), target.row_id()))
    }

    /// Sum of the live ledger rows for `target`, bypassing the cache.
    pub fn vote_tally(&self, target: VoteTarget) -> Result<i64> {
        let tally = self.db.connection().query_row(
            &format!(
                "SELECT COALESCE(SUM(vote_type), 0) FROM votes WHERE {} = ?1",
                target.ledger_column()
            ),
            [target.row_id()],
            |row| row.get(0),
        )?;
        Ok(tally)
    }

    /// The signed-in user's live vote on `target`. Anonymous sessions have none.
    pub fn user_vote(&self, session: &Session, target: VoteTarget) -> Result<Option<VoteType>> {
        let Some(user) = session.user() else {
            return Ok(None);
        };
        let vote = existing_vote(self.db.connection(), user, target)?;
        Ok(vote.map(|(_, vote_type)| vote_type))
    }

    /// Live ledger rows for `target`, oldest first.
    pub fn ledger(&self, target: VoteTarget) -> Result<Vec<Vote>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, user_id, vote_type, created_at
             FROM votes
             WHERE {} = ?1
             ORDER BY created_at, id",
            target.ledger_column()
        ))?;

        let rows = stmt.query_map([target.row_id()], |row| {
            Ok(Vote {
                id: row.get(0)?,
                user_id: row.get(1)?,
                target,
                vote_type: row.get(2)?,
                created_at: unix_time(row, 3)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

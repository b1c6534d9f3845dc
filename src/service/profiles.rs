use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{ForumService, counters};
use crate::db::{self, unix_time};
use crate::error::{ForumError, Result};
use crate::models::{Profile, UserId, validate_username};
use crate::session::Session;

const PROFILE_COLUMNS: &str = "user_id, username, display_name, bio, reputation, created_at";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        reputation: row.get(4)?,
        created_at: unix_time(row, 5)?,
    })
}

/// Fails with `NotFound` unless `user` has a profile.
pub(crate) fn ensure_profile(conn: &Connection, user: UserId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM profiles WHERE user_id = ?1)",
        [user],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(ForumError::not_found("profile", user));
    }
    Ok(())
}

impl ForumService {
    /// Creates the profile for an auth identity.
    ///
    /// The username is validated and must be unique ignoring case. A blank
    /// display name falls back to the username.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    /// let user = UserId::random();
    ///
    /// let profile = service.create_profile(user, "ferris", "Ferris the Crab")?;
    /// assert_eq!(profile.username, "ferris");
    /// assert_eq!(profile.reputation, 0);
    ///
    /// // Usernames are unique regardless of case
    /// assert!(service.create_profile(UserId::random(), "FERRIS", "").is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_profile(
        &self,
        user_id: UserId,
        username: &str,
        display_name: &str,
    ) -> Result<Profile> {
        let username = validate_username(username)?;
        let display_name = match display_name.trim() {
            "" => username,
            name => name,
        };

        let profile = self.db.write_transaction(|conn| -> Result<Profile> {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT username FROM profiles WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Err(ForumError::Conflict(format!(
                    "user {user_id} already has profile '{existing}'"
                )));
            }

            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM profiles WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(ForumError::Conflict(format!(
                    "username '{username}' is taken"
                )));
            }

            let now = db::now();
            conn.execute(
                "INSERT INTO profiles (user_id, username, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, username, display_name, now.unix_timestamp()],
            )?;

            Ok(Profile {
                user_id,
                username: username.to_string(),
                display_name: display_name.to_string(),
                bio: None,
                reputation: 0,
                created_at: now,
            })
        })?;

        tracing::debug!(user = %user_id, username = %profile.username, "created profile");
        Ok(profile)
    }

    /// Retrieves a profile by user id. Missing profiles are `None`.
    pub fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        let profile = self
            .db
            .connection()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                [user_id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Looks a profile up by username, ignoring case.
    pub fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let profile = self
            .db
            .connection()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = ?1"),
                [username.trim()],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Updates the signed-in user's display name and/or bio.
    ///
    /// `None` leaves a field unchanged. An empty bio clears it; an empty
    /// display name is rejected.
    pub fn update_profile(
        &self,
        session: &Session,
        display_name: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Profile> {
        let user = session.require_user()?;
        let display_name = display_name.map(str::trim);
        if display_name == Some("") {
            return Err(ForumError::validation("display_name", "cannot be empty"));
        }

        self.db.write_transaction(|conn| -> Result<Profile> {
            ensure_profile(conn, user)?;
            if let Some(name) = display_name {
                conn.execute(
                    "UPDATE profiles SET display_name = ?1 WHERE user_id = ?2",
                    params![name, user],
                )?;
            }
            if let Some(bio) = bio {
                let bio = Some(bio.trim()).filter(|b| !b.is_empty());
                conn.execute(
                    "UPDATE profiles SET bio = ?1 WHERE user_id = ?2",
                    params![bio, user],
                )?;
            }
            let profile = conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                [user],
                profile_from_row,
            )?;
            Ok(profile)
        })
    }

    /// Deletes the signed-in user's profile and everything it owns.
    ///
    /// The cascade removes the user's questions, answers, votes and
    /// notifications. Caches on surviving rows that counted any of the
    /// removed rows are recomputed from their sources in the same
    /// transaction.
    pub fn delete_profile(&self, session: &Session) -> Result<()> {
        let user = session.require_user()?;

        let repaired = self.db.write_transaction(|conn| -> Result<usize> {
            ensure_profile(conn, user)?;

            let voted_questions = collect_ids(
                conn,
                "SELECT question_id FROM votes WHERE user_id = ?1 AND question_id IS NOT NULL",
                user,
            )?;
            let voted_answers = collect_ids(
                conn,
                "SELECT answer_id FROM votes WHERE user_id = ?1 AND answer_id IS NOT NULL",
                user,
            )?;
            let answered_questions = collect_ids(
                conn,
                "SELECT DISTINCT question_id FROM answers WHERE author_id = ?1",
                user,
            )?;
            let used_tags = collect_ids(
                conn,
                "SELECT DISTINCT qt.tag_id FROM question_tags qt
                 JOIN questions q ON q.id = qt.question_id
                 WHERE q.author_id = ?1",
                user,
            )?;

            conn.execute("DELETE FROM profiles WHERE user_id = ?1", [user])?;

            let mut repaired = 0;
            repaired += counters::recount_question_votes(conn, &voted_questions)?;
            repaired += counters::recount_answer_votes(conn, &voted_answers)?;
            repaired += counters::recount_answer_counts(conn, &answered_questions)?;
            repaired += counters::recount_tag_usage(conn, &used_tags)?;
            Ok(repaired)
        })?;

        tracing::info!(user = %user, recounted = repaired, "deleted profile");
        Ok(())
    }
}

fn collect_ids(conn: &Connection, sql: &str, user: UserId) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([user], |row| row.get::<_, i64>(0))?;
    rows.collect()
}

use rusqlite::{Connection, Row, params};
use time::OffsetDateTime;

use super::ForumService;
use crate::db::unix_time;
use crate::error::{ForumError, Result};
use crate::models::{AnswerId, Notification, NotificationId, NotificationKind, QuestionId, UserId};
use crate::session::Session;

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        question_id: row.get(3)?,
        answer_id: row.get(4)?,
        actor_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: unix_time(row, 7)?,
    })
}

/// Queues a notification for `recipient` inside the caller's transaction.
///
/// Nothing is written when the recipient is the actor.
pub(crate) fn notify(
    conn: &Connection,
    recipient: UserId,
    kind: NotificationKind,
    question_id: QuestionId,
    answer_id: Option<AnswerId>,
    actor: UserId,
    at: OffsetDateTime,
) -> rusqlite::Result<()> {
    if recipient == actor {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO notifications (user_id, kind, question_id, answer_id, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            recipient,
            kind,
            question_id,
            answer_id,
            actor,
            at.unix_timestamp()
        ],
    )?;
    Ok(())
}

impl ForumService {
    /// Notifications for the signed-in user, newest first.
    pub fn list_notifications(
        &self,
        session: &Session,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let user = session.require_user()?;
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, question_id, answer_id, actor_id, is_read, created_at
             FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user, unread_only], notification_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn unread_count(&self, session: &Session) -> Result<i64> {
        let user = session.require_user()?;
        let count = self.db.connection().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Marks one of the signed-in user's notifications as read.
    ///
    /// Ids that do not exist or belong to someone else are `NotFound`.
    pub fn mark_notification_read(&self, session: &Session, id: NotificationId) -> Result<()> {
        let user = session.require_user()?;
        self.db.write_transaction(|conn| -> Result<()> {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user],
            )?;
            if changed == 0 {
                return Err(ForumError::not_found("notification", id));
            }
            Ok(())
        })
    }

    /// Marks every unread notification of the signed-in user as read and
    /// returns how many changed.
    pub fn mark_all_read(&self, session: &Session) -> Result<usize> {
        let user = session.require_user()?;
        let changed = self.db.write_transaction(|conn| -> Result<usize> {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user],
            )?)
        })?;
        tracing::debug!(user = %user, changed, "marked notifications read");
        Ok(changed)
    }
}

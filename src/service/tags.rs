use rusqlite::{Connection, OptionalExtension, Row, params};

use super::ForumService;
use crate::db::{self, unix_time};
use crate::error::{ForumError, Result};
use crate::models::{Tag, TagId, normalize_tag, palette_color};

const TAG_COLUMNS: &str = "id, name, usage_count, color, created_at";

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        usage_count: row.get(2)?,
        color: row.get(3)?,
        created_at: unix_time(row, 4)?,
    })
}

/// Finds or inserts the tag named `normalized` on `conn`.
///
/// The name must already be normalised. New tags get their palette colour
/// from the id SQLite assigns.
pub(crate) fn get_or_create_tag_in(conn: &Connection, normalized: &str) -> rusqlite::Result<TagId> {
    let existing: Option<TagId> = conn
        .query_row(
            "SELECT id FROM tags WHERE name = ?1 COLLATE NOCASE",
            [normalized],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO tags (name, color, created_at) VALUES (?1, '', ?2)",
        params![normalized, db::now().unix_timestamp()],
    )?;
    let id = TagId::new(conn.last_insert_rowid());
    conn.execute(
        "UPDATE tags SET color = ?1 WHERE id = ?2",
        params![palette_color(id), id],
    )?;

    tracing::debug!(tag = normalized, id = %id, "created tag");
    Ok(id)
}

impl ForumService {
    /// Gets an existing tag by name or creates a new one.
    ///
    /// Names are normalised first and matched case-insensitively, so
    /// "Machine Learning" and "machine-learning" are the same tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::{Database, ForumService};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = ForumService::new(Database::in_memory()?);
    ///
    /// let first = service.get_or_create_tag("Machine Learning")?;
    /// let second = service.get_or_create_tag("machine-learning")?;
    /// assert_eq!(first.id, second.id);
    /// assert_eq!(first.name, "machine-learning");
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let normalized = normalize_tag(name);
        if normalized.is_empty() {
            return Err(ForumError::validation("tag", "cannot be empty"));
        }

        self.db.write_transaction(|conn| -> Result<Tag> {
            let id = get_or_create_tag_in(conn, &normalized)?;
            let tag = conn.query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"),
                [id],
                tag_from_row,
            )?;
            Ok(tag)
        })
    }

    /// Looks a tag up by name, normalising it first.
    pub fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        let normalized = normalize_tag(name);
        let tag = self
            .db
            .connection()
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE name = ?1 COLLATE NOCASE"),
                [&normalized],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    /// Most used tags first; ties broken alphabetically.
    pub fn popular_tags(&self, limit: usize) -> Result<Vec<Tag>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags ORDER BY usage_count DESC, name ASC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], tag_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

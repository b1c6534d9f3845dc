mod migration;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use rusqlite::{Connection, Row};
use time::OffsetDateTime;

pub use migration::{MIGRATIONS, Migration};

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper providing connection management and schema initialization.
///
/// Several `Database` values may point at the same file (one per thread or
/// process). Every forum mutation runs in its own `BEGIN IMMEDIATE`
/// transaction so writers serialise on the file lock instead of racing.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist, switches it to WAL
    /// journaling and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened database file");

        let mut db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Enables foreign keys and brings the schema up to date.
    fn initialize_schema(&mut self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        migration::apply_pending_migrations(&mut self.conn)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. The transaction
    /// takes the write lock up front, so reads inside `f` see the state the
    /// writes will be applied to.
    pub(crate) fn write_transaction<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let conn = &self.conn;
        conn.execute_batch("BEGIN IMMEDIATE")?;

        match f(conn) {
            Ok(value) => match conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    conn.execute_batch("ROLLBACK").ok();
                    Err(e.into())
                }
            },
            Err(e) => {
                conn.execute_batch("ROLLBACK").ok();
                Err(e)
            }
        }
    }
}

/// Reads a unix-seconds column as an `OffsetDateTime`.
pub(crate) fn unix_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let seconds: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

/// Nullable variant of [`unix_time`].
pub(crate) fn optional_unix_time(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => unix_time(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Current time truncated to whole seconds, matching what is stored.
pub(crate) fn now() -> OffsetDateTime {
    let seconds = OffsetDateTime::now_utc().unix_timestamp();
    OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_opens_successfully() {
        let result = Database::in_memory();
        assert!(result.is_ok());
    }

    #[test]
    fn schema_tables_exist() {
        let db = Database::in_memory().unwrap();

        let tables: Vec<String> = db
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "profiles",
            "questions",
            "answers",
            "votes",
            "tags",
            "question_tags",
            "notifications",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn schema_indexes_exist() {
        let db = Database::in_memory().unwrap();

        let indexes: Vec<String> = db
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(indexes.contains(&"idx_answers_one_accepted".to_string()));
        assert!(indexes.contains(&"idx_votes_user_question".to_string()));
        assert!(indexes.contains(&"idx_votes_user_answer".to_string()));
        assert!(indexes.contains(&"idx_question_tags_tag".to_string()));
    }

    #[test]
    fn foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();

        let fk_enabled: i32 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert_eq!(fk_enabled, 1);
    }

    fn seed_question(conn: &Connection) {
        conn.execute(
            "INSERT INTO profiles (user_id, username, display_name, created_at)
             VALUES ('00000000-0000-0000-0000-000000000001', 'asker', 'Asker', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO questions (id, title, content, author_id, created_at)
             VALUES (1, 't', 'c', '00000000-0000-0000-0000-000000000001', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn vote_rows_need_exactly_one_target() {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        seed_question(conn);
        conn.execute(
            "INSERT INTO answers (id, question_id, author_id, content, created_at)
             VALUES (1, 1, '00000000-0000-0000-0000-000000000001', 'a', 0)",
            [],
        )
        .unwrap();

        let both = conn.execute(
            "INSERT INTO votes (user_id, question_id, answer_id, vote_type, created_at)
             VALUES ('00000000-0000-0000-0000-000000000001', 1, 1, 1, 0)",
            [],
        );
        assert!(both.is_err());

        let neither = conn.execute(
            "INSERT INTO votes (user_id, vote_type, created_at)
             VALUES ('00000000-0000-0000-0000-000000000001', 1, 0)",
            [],
        );
        assert!(neither.is_err());
    }

    #[test]
    fn ledger_rejects_second_vote_and_bad_weight() {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        seed_question(conn);

        let insert = "INSERT INTO votes (user_id, question_id, vote_type, created_at)
                      VALUES ('00000000-0000-0000-0000-000000000001', 1, ?1, 0)";
        conn.execute(insert, [1]).unwrap();
        assert!(conn.execute(insert, [-1]).is_err(), "duplicate vote");

        conn.execute("DELETE FROM votes", []).unwrap();
        assert!(conn.execute(insert, [2]).is_err(), "weight must be +/-1");
    }

    #[test]
    fn only_one_answer_per_question_can_be_accepted() {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        seed_question(conn);

        let insert = "INSERT INTO answers (question_id, author_id, content, is_accepted, created_at)
                      VALUES (1, '00000000-0000-0000-0000-000000000001', 'a', ?1, 0)";
        conn.execute(insert, [1]).unwrap();
        conn.execute(insert, [0]).unwrap();
        assert!(conn.execute(insert, [1]).is_err());
    }

    #[test]
    fn write_transaction_rolls_back_on_error() {
        let db = Database::in_memory().unwrap();

        let result: std::result::Result<(), rusqlite::Error> = db.write_transaction(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, username, display_name, created_at)
                 VALUES ('x', 'someone', 'S', 0)",
                [],
            )?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_creates_database_file_in_wal_mode() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("forum.db");

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());

        let mode: String = db
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("forum.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO profiles (user_id, username, display_name, created_at)
                     VALUES ('u', 'persisted', 'P', 0)",
                    [],
                )
                .unwrap();
        }

        let db2 = Database::open(&db_path).unwrap();
        let count: i32 = db2
            .connection()
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn unix_time_rejects_out_of_range_values() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT ?1", [i64::MAX], |row| unix_time(row, 0))
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(..)));

        let ok = conn
            .query_row("SELECT 0", [], |row| unix_time(row, 0))
            .unwrap();
        assert_eq!(ok, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn optional_unix_time_maps_null_to_none() {
        let conn = Connection::open_in_memory().unwrap();
        let none = conn
            .query_row("SELECT NULL", [], |row| optional_unix_time(row, 0))
            .unwrap();
        assert_eq!(none, None);

        let some = conn
            .query_row("SELECT 60", [], |row| optional_unix_time(row, 0))
            .unwrap();
        assert_eq!(some.map(OffsetDateTime::unix_timestamp), Some(60));
    }
}

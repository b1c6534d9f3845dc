mod acceptance;
mod answers;
mod counters;
mod notifications;
mod profiles;
mod questions;
mod tags;
mod votes;

pub use counters::{CounterAudit, CounterDrift, CounterKind};
pub use questions::{ListQuestionsOptions, QuestionOrder};

use crate::Database;

/// Service layer providing forum operations.
///
/// ForumService owns a Database instance and implements the consistency
/// rules of the forum: the vote ledger and its cached aggregates, answer
/// acceptance, and the view/answer counters. Every mutating method takes the
/// acting [`Session`](crate::Session) explicitly and runs as one write
/// transaction, returning the state as committed.
///
/// # Examples
///
/// ```
/// use qna::{Database, ForumService};
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let service = ForumService::new(db);
/// # Ok(())
/// # }
/// ```
pub struct ForumService {
    db: Database,
}

impl ForumService {
    /// Creates a new ForumService with the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct database access.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

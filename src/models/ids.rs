use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a row identifier newtype over an SQLite `INTEGER PRIMARY KEY`.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new identifier.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying ID value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_i64().map(Self)
            }
        }
    };
}

row_id!(
    /// Unique identifier for a question.
    QuestionId
);

row_id!(
    /// Unique identifier for an answer.
    AnswerId
);

row_id!(
    /// Unique identifier for a single vote row in the ledger.
    VoteId
);

row_id!(
    /// Unique identifier for a tag.
    TagId
);

row_id!(
    /// Unique identifier for a notification.
    NotificationId
);

/// Identity of a user, issued by the auth service.
///
/// Stored as hyphenated UUID text so rows stay readable from the sqlite shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wraps an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn get(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl ToSql for UserId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for UserId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: uuid::Error| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_serializes_as_raw_integer() {
        let id = QuestionId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let deserialized: QuestionId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn ids_are_not_interchangeable() {
        // These lines would fail to compile:
        // let question_id: QuestionId = AnswerId::new(1);
        // let answer_id: AnswerId = QuestionId::new(1);

        let question_id = QuestionId::new(1);
        let answer_id = AnswerId::new(1);

        assert_eq!(question_id.get(), answer_id.get());
    }

    #[test]
    fn user_id_parses_and_displays_hyphenated() {
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let id: UserId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn user_id_round_trips_through_sqlite_text() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let id = UserId::random();

        let stored: String = conn
            .query_row("SELECT ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, id.to_string());

        let loaded: UserId = conn
            .query_row("SELECT ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(loaded, id);
    }
}

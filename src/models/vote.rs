use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use super::{AnswerId, QuestionId, UserId, VoteId};

/// Direction of a vote.
///
/// Stored in the ledger as `+1` / `-1` so that a target's score is the plain
/// `SUM(vote_type)` of its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    /// Signed weight of this vote in the aggregate.
    pub fn value(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// Parses a stored ledger value. Anything other than `1` / `-1` is rejected.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

impl ToSql for VoteType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.value()))
    }
}

impl FromSql for VoteType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        Self::from_value(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// Something that can receive votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum VoteTarget {
    Question(QuestionId),
    Answer(AnswerId),
}

impl VoteTarget {
    /// Table holding the cached `vote_count` for this target.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Question(_) => "questions",
            Self::Answer(_) => "answers",
        }
    }

    /// Ledger column referencing this target.
    pub(crate) fn ledger_column(self) -> &'static str {
        match self {
            Self::Question(_) => "question_id",
            Self::Answer(_) => "answer_id",
        }
    }

    /// Raw row id of the target.
    pub fn row_id(self) -> i64 {
        match self {
            Self::Question(id) => id.get(),
            Self::Answer(id) => id.get(),
        }
    }

    /// Entity name used in error messages.
    pub(crate) fn entity(self) -> &'static str {
        match self {
            Self::Question(_) => "question",
            Self::Answer(_) => "answer",
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity(), self.row_id())
    }
}

/// A live row of the vote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub user_id: UserId,
    pub target: VoteTarget,
    pub vote_type: VoteType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What a cast did to the caller's ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChange {
    /// No previous vote; a new row was inserted.
    Cast,
    /// The previous vote had the opposite direction and was replaced.
    Switched,
    /// The previous vote had the same direction and was removed.
    Retracted,
}

/// Committed state of a target after a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub target: VoteTarget,
    pub change: VoteChange,
    /// The caller's live vote after the cast, `None` after a retraction.
    pub current: Option<VoteType>,
    /// Cached aggregate as committed.
    pub vote_count: i64,
}

impl VoteChange {
    /// Resolves a cast against the caller's existing vote.
    ///
    /// Returns the change kind and the delta to apply to the cached aggregate.
    pub fn resolve(existing: Option<VoteType>, requested: VoteType) -> (Self, i64) {
        match existing {
            None => (Self::Cast, requested.value()),
            Some(old) if old == requested => (Self::Retracted, -requested.value()),
            Some(old) => (Self::Switched, requested.value() - old.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_type_values_are_signed_unit() {
        assert_eq!(VoteType::Up.value(), 1);
        assert_eq!(VoteType::Down.value(), -1);
        assert_eq!(VoteType::from_value(1), Some(VoteType::Up));
        assert_eq!(VoteType::from_value(-1), Some(VoteType::Down));
        assert_eq!(VoteType::from_value(0), None);
        assert_eq!(VoteType::from_value(2), None);
    }

    #[test]
    fn resolve_first_vote_adds_its_weight() {
        assert_eq!(
            VoteChange::resolve(None, VoteType::Up),
            (VoteChange::Cast, 1)
        );
        assert_eq!(
            VoteChange::resolve(None, VoteType::Down),
            (VoteChange::Cast, -1)
        );
    }

    #[test]
    fn resolve_same_direction_toggles_off() {
        assert_eq!(
            VoteChange::resolve(Some(VoteType::Up), VoteType::Up),
            (VoteChange::Retracted, -1)
        );
        assert_eq!(
            VoteChange::resolve(Some(VoteType::Down), VoteType::Down),
            (VoteChange::Retracted, 1)
        );
    }

    #[test]
    fn resolve_opposite_direction_swings_by_two() {
        assert_eq!(
            VoteChange::resolve(Some(VoteType::Up), VoteType::Down),
            (VoteChange::Switched, -2)
        );
        assert_eq!(
            VoteChange::resolve(Some(VoteType::Down), VoteType::Up),
            (VoteChange::Switched, 2)
        );
    }

    #[test]
    fn vote_target_serializes_with_kind_tag() {
        let target = VoteTarget::Answer(AnswerId::new(7));
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"kind":"answer","id":7}"#);
    }

    #[test]
    fn vote_target_display() {
        assert_eq!(
            VoteTarget::Question(QuestionId::new(3)).to_string(),
            "question 3"
        );
    }
}

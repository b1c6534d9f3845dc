//! Derived-counter recomputation and drift auditing.
//!
//! The ledger and link tables are the source of truth; the `*_count` columns
//! and the accepted flags are caches. These helpers rebuild caches from their
//! sources and report rows where the two disagree.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use super::ForumService;
use crate::error::Result;

/// Recomputes `questions.vote_count` from the ledger.
const RECOUNT_QUESTION_VOTES: &str = "UPDATE questions SET vote_count =
    (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.question_id = questions.id)";

const RECOUNT_ANSWER_VOTES: &str = "UPDATE answers SET vote_count =
    (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.answer_id = answers.id)";

const RECOUNT_ANSWER_COUNTS: &str = "UPDATE questions SET answer_count =
    (SELECT COUNT(*) FROM answers a WHERE a.question_id = questions.id)";

const RECOUNT_TAG_USAGE: &str = "UPDATE tags SET usage_count =
    (SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = tags.id)";

fn recount_rows(conn: &Connection, recount: &str, ids: &[i64]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(&format!("{recount} WHERE id = ?1"))?;
    let mut changed = 0;
    for id in ids {
        changed += stmt.execute([id])?;
    }
    Ok(changed)
}

pub(crate) fn recount_question_votes(conn: &Connection, ids: &[i64]) -> rusqlite::Result<usize> {
    recount_rows(conn, RECOUNT_QUESTION_VOTES, ids)
}

pub(crate) fn recount_answer_votes(conn: &Connection, ids: &[i64]) -> rusqlite::Result<usize> {
    recount_rows(conn, RECOUNT_ANSWER_VOTES, ids)
}

pub(crate) fn recount_answer_counts(conn: &Connection, ids: &[i64]) -> rusqlite::Result<usize> {
    recount_rows(conn, RECOUNT_ANSWER_COUNTS, ids)
}

pub(crate) fn recount_tag_usage(conn: &Connection, ids: &[i64]) -> rusqlite::Result<usize> {
    recount_rows(conn, RECOUNT_TAG_USAGE, ids)
}

/// Which cache a drift entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    QuestionVotes,
    AnswerVotes,
    AnswerCount,
    /// `answers.is_accepted` disagrees with `questions.accepted_answer_id`.
    Acceptance,
    TagUsage,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::QuestionVotes => "question votes",
            Self::AnswerVotes => "answer votes",
            Self::AnswerCount => "answer count",
            Self::Acceptance => "acceptance",
            Self::TagUsage => "tag usage",
        };
        f.write_str(label)
    }
}

/// One cached value that differs from its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub kind: CounterKind,
    /// Id of the row holding the cache (question, answer or tag).
    pub row_id: i64,
    pub cached: i64,
    pub actual: i64,
}

/// Result of comparing every cache with its source rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterAudit {
    pub drifts: Vec<CounterDrift>,
}

impl CounterAudit {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

const DRIFT_QUERIES: &[(CounterKind, &str)] = &[
    (
        CounterKind::QuestionVotes,
        "SELECT id, cached, actual FROM (
             SELECT q.id, q.vote_count AS cached,
                    (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.question_id = q.id) AS actual
             FROM questions q)
         WHERE cached <> actual ORDER BY id",
    ),
    (
        CounterKind::AnswerVotes,
        "SELECT id, cached, actual FROM (
             SELECT a.id, a.vote_count AS cached,
                    (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.answer_id = a.id) AS actual
             FROM answers a)
         WHERE cached <> actual ORDER BY id",
    ),
    (
        CounterKind::AnswerCount,
        "SELECT id, cached, actual FROM (
             SELECT q.id, q.answer_count AS cached,
                    (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS actual
             FROM questions q)
         WHERE cached <> actual ORDER BY id",
    ),
    (
        CounterKind::Acceptance,
        "SELECT id, cached, actual FROM (
             SELECT a.id, a.is_accepted AS cached,
                    EXISTS(SELECT 1 FROM questions q
                           WHERE q.id = a.question_id AND q.accepted_answer_id = a.id) AS actual
             FROM answers a)
         WHERE cached <> actual ORDER BY id",
    ),
    (
        CounterKind::TagUsage,
        "SELECT id, cached, actual FROM (
             SELECT t.id, t.usage_count AS cached,
                    (SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = t.id) AS actual
             FROM tags t)
         WHERE cached <> actual ORDER BY id",
    ),
];

impl ForumService {
    /// Compares every cached counter and accepted flag with its source rows.
    pub fn audit_counters(&self) -> Result<CounterAudit> {
        let conn = self.db.connection();
        let mut audit = CounterAudit::default();

        for (kind, sql) in DRIFT_QUERIES {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(CounterDrift {
                    kind: *kind,
                    row_id: row.get(0)?,
                    cached: row.get(1)?,
                    actual: row.get(2)?,
                })
            })?;
            for drift in rows {
                let drift = drift?;
                tracing::warn!(
                    kind = %drift.kind,
                    row = drift.row_id,
                    cached = drift.cached,
                    actual = drift.actual,
                    "counter drift"
                );
                audit.drifts.push(drift);
            }
        }

        Ok(audit)
    }

    /// Rewrites every drifted cache from its source rows.
    ///
    /// Runs as one transaction and returns the number of rows changed.
    /// Accepted answers that point at another question's answer are cleared.
    pub fn repair_counters(&self) -> Result<usize> {
        let fixed = self.db.write_transaction(|conn| -> Result<usize> {
            let mut fixed = 0;
            fixed += conn.execute(
                &format!(
                    "{RECOUNT_QUESTION_VOTES} WHERE vote_count <>
                     (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.question_id = questions.id)"
                ),
                [],
            )?;
            fixed += conn.execute(
                &format!(
                    "{RECOUNT_ANSWER_VOTES} WHERE vote_count <>
                     (SELECT COALESCE(SUM(v.vote_type), 0) FROM votes v WHERE v.answer_id = answers.id)"
                ),
                [],
            )?;
            fixed += conn.execute(
                &format!(
                    "{RECOUNT_ANSWER_COUNTS} WHERE answer_count <>
                     (SELECT COUNT(*) FROM answers a WHERE a.question_id = questions.id)"
                ),
                [],
            )?;
            fixed += conn.execute(
                &format!(
                    "{RECOUNT_TAG_USAGE} WHERE usage_count <>
                     (SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = tags.id)"
                ),
                [],
            )?;

            // The question row is authoritative for acceptance. Drop references
            // to answers of other questions, then align the flags; clearing
            // before setting keeps the one-accepted-per-question index happy.
            fixed += conn.execute(
                "UPDATE questions SET accepted_answer_id = NULL
                 WHERE accepted_answer_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM answers a
                                   WHERE a.id = questions.accepted_answer_id
                                     AND a.question_id = questions.id)",
                [],
            )?;
            fixed += conn.execute(
                "UPDATE answers SET is_accepted = 0
                 WHERE is_accepted = 1
                   AND NOT EXISTS (SELECT 1 FROM questions q
                                   WHERE q.id = answers.question_id
                                     AND q.accepted_answer_id = answers.id)",
                [],
            )?;
            fixed += conn.execute(
                "UPDATE answers SET is_accepted = 1
                 WHERE is_accepted = 0
                   AND EXISTS (SELECT 1 FROM questions q
                               WHERE q.id = answers.question_id
                                 AND q.accepted_answer_id = answers.id)",
                [],
            )?;
            Ok(fixed)
        })?;

        tracing::info!(fixed, "repaired counters");
        Ok(fixed)
    }
}

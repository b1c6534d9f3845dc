//! Health check and maintenance utilities for the forum database.
//!
//! Provides the `doctor` command functionality:
//! - System health checks (database, migrations)
//! - Forum statistics
//! - Counter drift audit and repair

use std::io::{self, Write};

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::{CounterAudit, ForumService};

// ANSI color codes for terminal output
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Health status for a component.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// Component is healthy
    Ok,
    /// Component has a warning but is functional
    Warning(String),
    /// Component is not functional
    Error(String),
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }
}

/// Database health information.
#[derive(Debug)]
pub struct DatabaseHealth {
    pub status: HealthStatus,
    pub file_path: String,
    pub journal_mode: String,
}

/// Migration tracking information.
#[derive(Debug)]
pub struct MigrationInfo {
    pub version: u32,
    pub description: String,
    pub applied_at: OffsetDateTime,
}

impl MigrationInfo {
    /// One report line, e.g. `v2: Tags (applied 2026-01-05 14:03 UTC)`.
    fn summary(&self) -> String {
        let applied = self
            .applied_at
            .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
            .unwrap_or_else(|_| self.applied_at.unix_timestamp().to_string());
        format!("v{}: {} (applied {})", self.version, self.description, applied)
    }
}

/// Forum statistics for doctor output.
#[derive(Debug, Default)]
pub struct ForumStats {
    pub profiles: i64,
    pub questions: i64,
    pub closed_questions: i64,
    pub answers: i64,
    pub votes: i64,
    pub tags: i64,
    pub unread_notifications: i64,
}

// ============================================================================
// Health Check Functions
// ============================================================================

/// Performs all health checks and prints results.
pub fn run_health_checks(db_path: &str, service: &ForumService) -> Result<()> {
    let db_health = check_database_health(db_path, service);
    let migrations = get_applied_migrations(service)?;
    let stats = get_forum_stats(service)?;
    let audit = service
        .audit_counters()
        .context("Failed to audit counters")?;

    print_health_report(&db_health, &migrations, &stats, &audit);

    Ok(())
}

fn check_database_health(db_path: &str, service: &ForumService) -> DatabaseHealth {
    let conn = service.database().connection();
    let status = match conn.query_row("SELECT 1", [], |_| Ok(())) {
        Ok(_) => HealthStatus::Ok,
        Err(e) => HealthStatus::Error(format!("Connection test failed: {}", e)),
    };

    let journal_mode = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
        .unwrap_or_else(|_| "unknown".to_string());

    // Shared file databases rely on WAL so readers don't block the writer
    let status = match status {
        HealthStatus::Ok if db_path != ":memory:" && !journal_mode.eq_ignore_ascii_case("wal") => {
            HealthStatus::Warning(format!("journal mode is {journal_mode}, expected wal"))
        }
        other => other,
    };

    DatabaseHealth {
        status,
        file_path: db_path.to_string(),
        journal_mode,
    }
}

fn get_applied_migrations(service: &ForumService) -> Result<Vec<MigrationInfo>> {
    let conn = service.database().connection();

    let mut stmt = conn.prepare(
        "SELECT version, applied_at, description FROM schema_migrations ORDER BY version",
    )?;

    let migrations = stmt.query_map([], |row| {
        Ok(MigrationInfo {
            version: row.get(0)?,
            applied_at: crate::db::unix_time(row, 1)?,
            description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        })
    })?;

    migrations.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn get_forum_stats(service: &ForumService) -> Result<ForumStats> {
    let conn = service.database().connection();
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    Ok(ForumStats {
        profiles: count("SELECT COUNT(*) FROM profiles")?,
        questions: count("SELECT COUNT(*) FROM questions")?,
        closed_questions: count("SELECT COUNT(*) FROM questions WHERE accepted_at IS NOT NULL")?,
        answers: count("SELECT COUNT(*) FROM answers")?,
        votes: count("SELECT COUNT(*) FROM votes")?,
        tags: count("SELECT COUNT(*) FROM tags")?,
        unread_notifications: count("SELECT COUNT(*) FROM notifications WHERE is_read = 0")?,
    })
}

// ============================================================================
// Pretty Printing
// ============================================================================

fn status_symbol(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Ok => "\u{2713}",
        HealthStatus::Warning(_) => "!",
        HealthStatus::Error(_) => "\u{2717}",
    }
}

fn status_color(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Ok => GREEN,
        HealthStatus::Warning(_) => YELLOW,
        HealthStatus::Error(_) => RED,
    }
}

fn audit_status(audit: &CounterAudit) -> HealthStatus {
    if audit.is_consistent() {
        HealthStatus::Ok
    } else {
        HealthStatus::Warning(format!("{} drifted counters", audit.drifts.len()))
    }
}

fn print_health_report(
    db: &DatabaseHealth,
    migrations: &[MigrationInfo],
    stats: &ForumStats,
    audit: &CounterAudit,
) {
    println!("{}qna doctor{}", BOLD, RESET);
    println!();

    // Database section
    println!("{}Database{}", BOLD, RESET);
    let status_text = match &db.status {
        HealthStatus::Ok => "OK".to_string(),
        HealthStatus::Warning(w) => w.clone(),
        HealthStatus::Error(e) => e.clone(),
    };
    println!(
        "  {}{}{} Connection: {}",
        status_color(&db.status),
        status_symbol(&db.status),
        RESET,
        status_text
    );
    println!("    {}Path: {}{}", DIM, db.file_path, RESET);
    println!("    {}Journal: {}{}", DIM, db.journal_mode, RESET);
    println!();

    // Migrations section
    println!("{}Migrations{}", BOLD, RESET);
    if migrations.is_empty() {
        println!("  {}No migrations applied{}", YELLOW, RESET);
    } else {
        for m in migrations {
            let check = status_symbol(&HealthStatus::Ok);
            println!("  {}{}{} {}", GREEN, check, RESET, m.summary());
        }
    }
    println!();

    // Counters section
    println!("{}Counters{}", BOLD, RESET);
    let status = audit_status(audit);
    println!(
        "  {}{}{} {}",
        status_color(&status),
        status_symbol(&status),
        RESET,
        if status.is_ok() {
            "All caches match their source rows".to_string()
        } else {
            format!("{} drifted (run `qna doctor --repair`)", audit.drifts.len())
        }
    );
    print_drifts(audit, 10);
    println!();

    // Statistics section
    println!("{}Statistics{}", BOLD, RESET);
    println!("  Profiles:   {:>6}", stats.profiles);
    println!("  Questions:  {:>6} total", stats.questions);
    if stats.questions > 0 {
        println!(
            "              {:>6} closed    {:>6} open",
            stats.closed_questions,
            stats.questions - stats.closed_questions
        );
    }
    println!("  Answers:    {:>6}", stats.answers);
    println!("  Votes:      {:>6}", stats.votes);
    println!("  Tags:       {:>6}", stats.tags);
    println!("  Unread:     {:>6}", stats.unread_notifications);
}

fn print_drifts(audit: &CounterAudit, limit: usize) {
    for drift in audit.drifts.iter().take(limit) {
        println!(
            "    {}{} #{}: cached {} actual {}{}",
            DIM, drift.kind, drift.row_id, drift.cached, drift.actual, RESET
        );
    }
    if audit.drifts.len() > limit {
        println!(
            "    {}... and {} more{}",
            DIM,
            audit.drifts.len() - limit,
            RESET
        );
    }
}

// ============================================================================
// Repair
// ============================================================================

/// Prompts user for confirmation.
pub fn confirm_repair() -> bool {
    print!("\nRewrite drifted counters from their source rows? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Audits counters and, when drift is found, repairs it.
///
/// Returns the number of rows rewritten. `confirm` is asked only when there
/// is something to fix.
pub fn run_repair(service: &ForumService, confirm: impl FnOnce() -> bool) -> Result<usize> {
    let audit = service
        .audit_counters()
        .context("Failed to audit counters")?;

    if audit.is_consistent() {
        println!("{}Nothing to repair{}", GREEN, RESET);
        return Ok(0);
    }

    println!(
        "{}Drifted counters: {}{}",
        BOLD,
        audit.drifts.len(),
        RESET
    );
    print_drifts(&audit, 20);

    if !confirm() {
        println!("Cancelled.");
        return Ok(0);
    }

    let fixed = service
        .repair_counters()
        .context("Failed to repair counters")?;
    println!("{}Repaired {} rows{}", GREEN, fixed, RESET);
    Ok(fixed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, NewQuestion, Session, UserId};

    fn seeded_service() -> ForumService {
        let service = ForumService::new(Database::in_memory().unwrap());
        let user = UserId::random();
        service.create_profile(user, "asker", "").unwrap();
        let session = Session::signed_in(user);
        let question = service
            .post_question(&session, &NewQuestion::new("Q", "body", ["rust"]))
            .unwrap();
        service.post_answer(&session, question.id, "answer").unwrap();
        service
    }

    #[test]
    fn test_health_status_is_ok() {
        assert!(HealthStatus::Ok.is_ok());
        assert!(!HealthStatus::Warning("test".into()).is_ok());
        assert!(!HealthStatus::Error("test".into()).is_ok());
    }

    #[test]
    fn test_get_forum_stats_empty_database() {
        let service = ForumService::new(Database::in_memory().unwrap());

        let stats = get_forum_stats(&service).unwrap();

        assert_eq!(stats.profiles, 0);
        assert_eq!(stats.questions, 0);
        assert_eq!(stats.votes, 0);
        assert_eq!(stats.tags, 0);
    }

    #[test]
    fn test_get_forum_stats_with_data() {
        let service = seeded_service();

        let stats = get_forum_stats(&service).unwrap();

        assert_eq!(stats.profiles, 1);
        assert_eq!(stats.questions, 1);
        assert_eq!(stats.closed_questions, 0);
        assert_eq!(stats.answers, 1);
        assert_eq!(stats.tags, 1);
        // Self-answers don't notify
        assert_eq!(stats.unread_notifications, 0);
    }

    #[test]
    fn test_get_applied_migrations() {
        let service = ForumService::new(Database::in_memory().unwrap());

        let migrations = get_applied_migrations(&service).unwrap();

        assert!(!migrations.is_empty());
        assert!(migrations.iter().any(|m| m.version == 1));
        // Applied just now, not at the epoch
        assert!(migrations.iter().all(|m| m.applied_at.year() >= 2024));
    }

    #[test]
    fn test_migration_summary_includes_applied_time() {
        let info = MigrationInfo {
            version: 2,
            description: "Tags".to_string(),
            applied_at: OffsetDateTime::from_unix_timestamp(1_767_621_780).unwrap(),
        };

        assert_eq!(info.summary(), "v2: Tags (applied 2026-01-05 14:03 UTC)");
    }

    #[test]
    fn test_in_memory_database_is_healthy() {
        let service = ForumService::new(Database::in_memory().unwrap());
        let health = check_database_health(":memory:", &service);
        assert!(health.status.is_ok());
    }

    #[test]
    fn test_run_repair_skips_confirmation_when_consistent() {
        let service = seeded_service();
        let fixed = run_repair(&service, || panic!("should not ask")).unwrap();
        assert_eq!(fixed, 0);
    }

    #[test]
    fn test_run_repair_respects_declined_confirmation() {
        let service = seeded_service();
        service
            .database()
            .connection()
            .execute("UPDATE questions SET answer_count = 9", [])
            .unwrap();

        assert_eq!(run_repair(&service, || false).unwrap(), 0);
        assert!(!service.audit_counters().unwrap().is_consistent());

        assert_eq!(run_repair(&service, || true).unwrap(), 1);
        assert!(service.audit_counters().unwrap().is_consistent());
    }
}

//! Shared utility functions for database paths and CLI input.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Gets the cross-platform default database path.
///
/// Returns the path as `{data_dir}/qna/forum.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("qna").join("forum.db"))
}

/// Ensures the parent directory of the database file exists.
///
/// Creates the directory structure if it doesn't exist using `create_dir_all`.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Parses comma-separated tags from a string.
///
/// Splits on commas, trims whitespace from each tag, and filters out empty strings.
///
/// # Examples
///
/// ```
/// use qna::utils::parse_tags;
///
/// let tags = parse_tags("rust, learning, ");
/// assert_eq!(tags, vec!["rust", "learning"]);
/// ```
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn get_database_path_returns_valid_path() {
        let path = get_database_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("qna"));
        assert!(path.to_string_lossy().ends_with("forum.db"));
    }

    #[test]
    fn ensure_database_directory_creates_missing_parents() {
        let dir = tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("nested").join("deeper").join("forum.db");

        ensure_database_directory(&db_path).expect("failed to create directories");

        assert!(db_path.parent().unwrap().is_dir());
    }

    #[test]
    fn parse_tags_with_normal_input() {
        assert_eq!(parse_tags("rust,learning"), vec!["rust", "learning"]);
    }

    #[test]
    fn parse_tags_with_whitespace() {
        assert_eq!(parse_tags(" rust , learning "), vec!["rust", "learning"]);
    }

    #[test]
    fn parse_tags_with_empty_elements() {
        assert_eq!(parse_tags("rust,,learning,"), vec!["rust", "learning"]);
    }

    #[test]
    fn parse_tags_only_whitespace() {
        assert!(parse_tags("  ,  ,  ").is_empty());
        assert!(parse_tags("").is_empty());
    }
}

//! Runtime configuration read from the environment.
//!
//! The binary loads a `.env` file with `dotenvy` before calling
//! [`Config::from_env`], so every setting can live there too.

use std::path::PathBuf;

use anyhow::Result;

use crate::utils::get_database_path;

/// Overrides the database file location.
pub const DB_PATH_VAR: &str = "QNA_DB_PATH";
/// Username the CLI acts as when `--as` is not given.
pub const USER_VAR: &str = "QNA_USER";
/// `tracing` filter directive, e.g. `qna=debug`.
pub const LOG_VAR: &str = "QNA_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

/// Settings shared by every CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub user: Option<String>,
    pub log_filter: String,
}

impl Config {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value. Blank values count as unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use qna::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_lookup(|key| match key {
    ///     "QNA_DB_PATH" => Some("/tmp/forum.db".to_string()),
    ///     "QNA_USER" => Some("ferris".to_string()),
    ///     _ => None,
    /// })?;
    ///
    /// assert_eq!(config.database_path.to_str(), Some("/tmp/forum.db"));
    /// assert_eq!(config.user.as_deref(), Some("ferris"));
    /// assert_eq!(config.log_filter, "warn");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = match get(DB_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => get_database_path()?,
        };

        let log_filter = get(LOG_VAR)
            .or_else(|| get("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_path,
            user: get(USER_VAR),
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, get_database_path().unwrap());
        assert_eq!(config.user, None);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn qna_log_wins_over_rust_log() {
        let config =
            Config::from_lookup(lookup(&[(LOG_VAR, "qna=debug"), ("RUST_LOG", "info")])).unwrap();
        assert_eq!(config.log_filter, "qna=debug");

        let config = Config::from_lookup(lookup(&[("RUST_LOG", "info")])).unwrap();
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config =
            Config::from_lookup(lookup(&[(USER_VAR, "  "), (DB_PATH_VAR, "")])).unwrap();
        assert_eq!(config.user, None);
        assert_eq!(config.database_path, get_database_path().unwrap());
    }
}

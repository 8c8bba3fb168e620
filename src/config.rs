use std::path::PathBuf;

use crate::db::Database;

pub const DB_ENV: &str = "ATS_DB";
pub const DOWNLOAD_DIR_ENV: &str = "ATS_DOWNLOAD_DIR";
pub const LOG_ENV: &str = "ATS_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn,ats=info";

/// Runtime settings. Precedence: explicit flag, then environment, then
/// platform default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub download_dir: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn resolve(db_path: Option<PathBuf>, download_dir: Option<PathBuf>) -> Self {
        Self::resolve_with(db_path, download_dir, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        db_path: Option<PathBuf>,
        download_dir: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let from_env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_path = db_path
            .or_else(|| from_env(DB_ENV).map(PathBuf::from))
            .unwrap_or_else(Database::default_path);
        let download_dir = download_dir
            .or_else(|| from_env(DOWNLOAD_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(default_download_dir);
        let log_filter = from_env(LOG_ENV)
            .or_else(|| from_env("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            db_path,
            download_dir,
            log_filter,
        }
    }
}

fn default_download_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_flags_win_over_env() {
        let config = Config::resolve_with(
            Some(PathBuf::from("/flag/ats.db")),
            Some(PathBuf::from("/flag/downloads")),
            env_of(&[(DB_ENV, "/env/ats.db"), (DOWNLOAD_DIR_ENV, "/env/dl")]),
        );
        assert_eq!(config.db_path, PathBuf::from("/flag/ats.db"));
        assert_eq!(config.download_dir, PathBuf::from("/flag/downloads"));
    }

    #[test]
    fn test_env_used_without_flags() {
        let config = Config::resolve_with(
            None,
            None,
            env_of(&[
                (DB_ENV, "/env/ats.db"),
                (DOWNLOAD_DIR_ENV, "/env/dl"),
                (LOG_ENV, "debug"),
            ]),
        );
        assert_eq!(config.db_path, PathBuf::from("/env/ats.db"));
        assert_eq!(config.download_dir, PathBuf::from("/env/dl"));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve_with(None, None, env_of(&[(DB_ENV, "  ")]));
        assert_eq!(config.db_path, Database::default_path());
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.db_path.ends_with("ats.db"));
    }

    #[test]
    fn test_rust_log_fallback() {
        let config = Config::resolve_with(None, None, env_of(&[("RUST_LOG", "trace")]));
        assert_eq!(config.log_filter, "trace");
    }
}

//! Shared database-path handling with tempdir fallback.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;
use thiserror::Error;
use tracing::warn;

use crate::config;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One database location: an env-overridable default path plus a tempdir
/// fallback that sticks once a disk I/O error has been seen.
pub struct DbLocation {
    env_var: &'static str,
    default_path: &'static str,
    fallback_file: &'static str,
    active: Mutex<Option<PathBuf>>,
    fallback_logged: AtomicBool,
}

impl DbLocation {
    pub const fn new(
        env_var: &'static str,
        default_path: &'static str,
        fallback_file: &'static str,
    ) -> Self {
        Self {
            env_var,
            default_path,
            fallback_file,
            active: Mutex::new(None),
            fallback_logged: AtomicBool::new(false),
        }
    }

    /// Current active path; resolved lazily from the env override or the
    /// built-in default.
    pub fn active_path(&self) -> PathBuf {
        let mut guard = match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(path) = guard.as_ref() {
            return path.clone();
        }
        let path = config::var(self.env_var)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(self.default_path));
        *guard = Some(path.clone());
        path
    }

    /// Switch to the tempdir fallback path and return it.
    pub fn set_fallback(&self) -> PathBuf {
        let fallback = std::env::temp_dir().join("verisift").join(self.fallback_file);
        if !self.fallback_logged.swap(true, Ordering::SeqCst) {
            warn!(path = %fallback.display(), "数据库路径不可写，已回退到临时目录");
        }
        let mut guard = match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(fallback.clone());
        fallback
    }

    /// Test hook: pin the active path explicitly.
    pub fn set_path(&self, path: PathBuf) {
        let mut guard = match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(path);
    }
}

fn is_disk_io_error(err: &rusqlite::Error) -> bool {
    err.to_string().to_lowercase().contains("disk i/o error")
}

/// Open a connection to the location's active path and apply the schema.
fn connect(location: &DbLocation, schema: &[&str]) -> Result<Connection, StoreError> {
    let path = location.active_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&path)?;
    for statement in schema {
        conn.execute_batch(statement)?;
    }
    Ok(conn)
}

/// Run one store operation against the active path, falling back to the
/// tempdir database on a disk I/O error.
pub fn with_connection<T>(
    location: &DbLocation,
    schema: &[&str],
    op: impl Fn(&Connection) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let first = connect(location, schema).and_then(|conn| op(&conn));
    match first {
        Ok(value) => Ok(value),
        Err(StoreError::Database(ref e)) if is_disk_io_error(e) => {
            location.set_fallback();
            let conn = connect(location, schema)?;
            op(&conn)
        }
        Err(other) => Err(other),
    }
}

/// UTC timestamp in the store's canonical format.
pub fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Per-process scratch directory shared by every unit test touching the
/// store globals, so concurrent tests agree on the active paths.
#[cfg(test)]
pub(crate) fn test_db_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("verisift-tests-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_path_prefers_env_override() {
        static LOCATION: DbLocation =
            DbLocation::new("TEST_DB_PATH_A", "data/test/a.db", "a.db");
        std::env::set_var("VERISIFT_TEST_DB_PATH_A", "/tmp/verisift-test/custom.db");
        assert_eq!(
            LOCATION.active_path(),
            PathBuf::from("/tmp/verisift-test/custom.db")
        );
        std::env::remove_var("VERISIFT_TEST_DB_PATH_A");
    }

    #[test]
    fn test_fallback_path_is_sticky() {
        static LOCATION: DbLocation =
            DbLocation::new("TEST_DB_PATH_B", "data/test/b.db", "b.db");
        let fallback = LOCATION.set_fallback();
        assert!(fallback.ends_with("verisift/b.db"));
        assert_eq!(LOCATION.active_path(), fallback);
    }
}

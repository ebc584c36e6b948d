//! Verdict persistence
//!
//! One row per username. The primary key on `username` is what keeps
//! concurrent first requests from storing two verdicts; the losing insert
//! comes back as [`StoreError::DuplicateKey`].

use chrono::Utc;
use rusqlite::{ffi, params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS verdicts (
    username TEXT PRIMARY KEY NOT NULL,
    survive INTEGER NOT NULL,
    result TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a verdict for '{0}' already exists")]
    DuplicateKey(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored survival verdict. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub username: String,
    pub survive: bool,
    pub result: String,
    pub created_at: String,
}

/// Verdict database handle (thread-safe via Mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Open or create the database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            conn.execute_batch(SCHEMA)?;
            conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
            tracing::info!("initialized verdict schema version {}", SCHEMA_VERSION);
        }

        Ok(())
    }

    /// Exact-match lookup by username
    pub fn find_by_username(&self, username: &str) -> Result<Option<Verdict>> {
        let conn = self.conn()?;
        let verdict = conn
            .query_row(
                "SELECT username, survive, result, created_at FROM verdicts WHERE username = ?1",
                params![username],
                |row| {
                    Ok(Verdict {
                        username: row.get(0)?,
                        survive: row.get(1)?,
                        result: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(verdict)
    }

    /// Insert a new verdict. Fails with `DuplicateKey` if the username is already taken.
    pub fn create(&self, username: &str, survive: bool, result: &str) -> Result<Verdict> {
        let verdict = Verdict {
            username: username.to_string(),
            survive,
            result: result.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO verdicts (username, survive, result, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                verdict.username,
                verdict.survive,
                verdict.result,
                verdict.created_at
            ],
        )
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateKey(username.to_string())
            } else {
                StoreError::Sqlite(err)
            }
        })?;

        Ok(verdict)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM verdicts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() -> Result<()> {
        let db = Database::in_memory()?;

        assert!(db.find_by_username("ada")?.is_none());

        let created = db.create("ada", true, "You *live*. Somehow.")?;
        let fetched = db.find_by_username("ada")?.expect("verdict should exist");

        assert_eq!(fetched, created);
        assert!(fetched.survive);
        assert_eq!(fetched.result, "You *live*. Somehow.");
        Ok(())
    }

    #[test]
    fn test_duplicate_username_rejected() -> Result<()> {
        let db = Database::in_memory()?;
        db.create("ada", false, "first")?;

        let err = db.create("ada", true, "second").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref name) if name == "ada"));

        let kept = db.find_by_username("ada")?.expect("verdict should exist");
        assert!(!kept.survive);
        assert_eq!(kept.result, "first");
        assert_eq!(db.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_username_is_case_sensitive() -> Result<()> {
        let db = Database::in_memory()?;
        db.create("Ada", true, "upper")?;

        assert!(db.find_by_username("ada")?.is_none());
        db.create("ada", false, "lower")?;
        assert_eq!(db.count()?, 2);
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_records() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "uprising-store-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        {
            let db = Database::open(&path)?;
            db.create("grace", true, "Kept.")?;
        }

        let db = Database::open(&path)?;
        let fetched = db.find_by_username("grace")?.expect("verdict should persist");
        assert_eq!(fetched.result, "Kept.");

        drop(db);
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}

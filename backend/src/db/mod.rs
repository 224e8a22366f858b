//! SQLite persistence for the registry, the schema store and the ledger.
//!
//! Every operation opens its own connection (the store is used from blocking
//! worker threads, never from the async executor directly). Write paths that
//! must be atomic take a `BEGIN IMMEDIATE` transaction so SQLite serializes
//! them against each other.

pub mod projects;
pub mod schemas;
pub mod submissions;

use crate::error::Result;
use log::warn;
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    name                   TEXT NOT NULL UNIQUE,
    created_at             TEXT NOT NULL,
    password_hash          TEXT NOT NULL,
    current_schema_version INTEGER
);

CREATE TABLE IF NOT EXISTS schema_versions (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    version    INTEGER NOT NULL CHECK (version >= 1),
    structure  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (project_id, version)
);

CREATE TABLE IF NOT EXISTS submissions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id     INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    center_name    TEXT NOT NULL,
    uploader_name  TEXT,
    filename       TEXT NOT NULL,
    upload_date    TEXT NOT NULL,
    schema_version INTEGER,
    status         TEXT NOT NULL CHECK (status IN ('validated', 'failed')),
    report         TEXT,
    columns        TEXT NOT NULL,
    row_count      INTEGER NOT NULL,
    ragged_rows    INTEGER NOT NULL DEFAULT 0,
    file_size      INTEGER NOT NULL,
    file_locator   TEXT,
    -- Set while the rows are still being written; such a submission is
    -- invisible to every read path until it is activated.
    pending        INTEGER NOT NULL DEFAULT 0,
    active         INTEGER NOT NULL DEFAULT 1,
    superseded_by  INTEGER,
    superseded_at  TEXT
);

-- At most one active submission per (project, center).
CREATE UNIQUE INDEX IF NOT EXISTS submissions_one_active
    ON submissions (project_id, center_name) WHERE active = 1;
CREATE INDEX IF NOT EXISTS submissions_by_project ON submissions (project_id, id);

CREATE TABLE IF NOT EXISTS submission_rows (
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    row_index     INTEGER NOT NULL,
    cells         TEXT NOT NULL,
    PRIMARY KEY (submission_id, row_index)
);
"#;

/// Handle to the on-disk database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    pub fn new(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh connection with the pragmas every caller relies on.
    pub fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA journal_mode = wal;")?;
        Ok(conn)
    }

    /// Creates missing tables and drops submissions left half-written by a
    /// previous process. Safe to call on every start.
    pub fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA_SQL)?;
        let abandoned = conn.execute("DELETE FROM submissions WHERE pending = 1", [])?;
        if abandoned > 0 {
            warn!("discarded {} submissions that were never activated", abandoned);
        }
        Ok(())
    }

    /// Runs `f` on a fresh connection on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.open()?;
            f(&mut conn)
        })
        .await?
    }

    pub fn ping(&self) -> Result<()> {
        let conn = self.open()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Database;
    use tempfile::TempDir;

    /// A database in a throwaway directory; keep the `TempDir` alive.
    pub fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("test.sqlite"), 5_000);
        db.init().expect("init schema");
        (dir, db)
    }
}

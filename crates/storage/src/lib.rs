//! Embedded relational store (§4.A).
//!
//! `rusqlite` (bundled) backs a single on-disk file; one writer at a time
//! is enforced by an internal mutex around the connection, readers and
//! writers alike serialize through it — simple and correct at the scale
//! this control plane runs at. A process-wide [`once_cell::sync::OnceCell`]
//! keeps `Storage::open` idempotent across repeated calls against the
//! same directory.

mod admin;
mod analytics;
mod messages;
mod migrations;
pub mod query;
pub mod records;
mod sessions;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rusqlite::Connection;

use conductor_domain::error::Result;

pub use query::Query;
pub use records::{
    AnalyticsFields, ClaudeCommand, CommandStat, MessageRecord, Notification, NotificationStats,
    SessionRecord, ShellCommand, UserMessage,
};

static SINGLETON: OnceCell<Storage> = OnceCell::new();

#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Storage {
    /// Open (or create) the database file under `dir`, running migrations.
    /// Subsequent calls with the same process reuse the first handle,
    /// matching the "process-wide singleton" invariant in §4.A.
    pub fn open(dir: &Path) -> Result<Self> {
        if let Some(existing) = SINGLETON.get() {
            return Ok(existing.clone());
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join("conductor.sqlite3");
        let mut conn = Connection::open(&path).map_err(migrations::storage_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(migrations::storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(migrations::storage_err)?;
        migrations::run(&mut conn)?;

        let storage = Storage {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        tracing::info!(path = %storage.path.display(), "storage opened");
        let _ = SINGLETON.set(storage.clone());
        Ok(storage)
    }

    /// Open an independent, non-singleton handle — used by tests that need
    /// isolated databases within the same process.
    #[doc(hidden)]
    pub fn open_for_test(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("conductor.sqlite3");
        let mut conn = Connection::open(&path).map_err(migrations::storage_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(migrations::storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(migrations::storage_err)?;
        migrations::run(&mut conn)?;
        Ok(Storage {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reclaim disk space (§4.A Vacuum). Must follow any bulk delete.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("VACUUM;").map_err(migrations::storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_file_and_is_idempotent_within_handle() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        assert!(storage.path().exists());
        // Re-running migrations on the same connection must not error.
        storage.vacuum().unwrap();
    }
}

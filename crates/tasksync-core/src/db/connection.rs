//! Database handle and per-request connections

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

use super::migrations;

/// Tuning for connections opened by a [`Database`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a connection waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreOptions {
    /// Set the busy timeout
    #[must_use]
    pub const fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// Handle to the `SQLite` database file
///
/// Holds no open connection: every unit of work calls [`Database::connect`]
/// and drops its connection when done, so nothing mutable is shared between
/// requests.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    options: StoreOptions,
}

impl Database {
    /// Open the database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations once, before any request is served.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let database = Self { path, options };
        let mut conn = database.connect()?;
        migrations::run(&mut conn)?;
        tracing::debug!("Database ready at {}", database.path.display());
        Ok(database)
    }

    /// Open a fresh connection for one unit of work
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        self.configure(&conn)?;
        Ok(conn)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure(&self, conn: &Connection) -> Result<()> {
        conn.busy_timeout(self.options.busy_timeout)?;
        // WAL lets readers proceed while a sync holds the write lock
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }
}

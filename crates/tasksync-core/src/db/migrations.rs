//! Database migrations

use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::error::{Error, Result};

/// Current schema version
const CURRENT_VERSION: i32 = 1;

const CREATE_TASKS_TABLE: &str = "CREATE TABLE tasks (
    id TEXT NOT NULL,
    token TEXT NOT NULL,
    name TEXT NOT NULL,
    estimated_time INTEGER,
    long_cycle INTEGER,
    cycle_list TEXT,
    progress INTEGER DEFAULT 0,
    deadline INTEGER,
    completed INTEGER DEFAULT 0,
    time_up INTEGER DEFAULT 0,
    urgent INTEGER DEFAULT 0,
    important INTEGER DEFAULT 0,
    description TEXT,
    timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (id, token)
)";

const TASK_COLUMNS: &str = "id, token, name, estimated_time, long_cycle, cycle_list, progress, \
     deadline, completed, time_up, urgent, important, description, timestamp";

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: tenants and tenant-scoped tasks
///
/// Databases written by older servers already hold `users` and a `tasks`
/// table keyed by task id alone; that table is rebuilt with the compound
/// `(id, token)` key, keeping every row.
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS users (
            token TEXT PRIMARY KEY,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            last_sync_at INTEGER
        );",
    )?;

    match task_primary_key(&tx)? {
        None => {
            tx.execute_batch(CREATE_TASKS_TABLE)?;
        }
        Some(key) if key == ["id", "token"] => {}
        Some(key) => {
            tracing::info!("Upgrading legacy tasks table keyed by ({})", key.join(", "));
            rebuild_legacy_tasks(&tx)?;
        }
    }

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tasks_token ON tasks(token);
         INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

/// Primary key columns of `tasks`, in key order, or `None` if the table is missing
fn task_primary_key(tx: &Transaction<'_>) -> Result<Option<Vec<String>>> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='tasks'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(None);
    }

    let mut stmt =
        tx.prepare("SELECT name FROM pragma_table_info('tasks') WHERE pk > 0 ORDER BY pk")?;
    let key = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(key))
}

fn rebuild_legacy_tasks(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch("ALTER TABLE tasks RENAME TO tasks_old")?;
    tx.execute_batch(CREATE_TASKS_TABLE)?;

    // Legacy rows can repeat an (id, token) pair when the old table had no key
    let copied = tx
        .execute(
            &format!(
                "INSERT OR REPLACE INTO tasks ({TASK_COLUMNS}) SELECT {TASK_COLUMNS} FROM tasks_old"
            ),
            [],
        )
        .map_err(|error| Error::Migration(format!("copying legacy tasks failed: {error}")))?;

    tx.execute_batch("DROP TABLE tasks_old")?;
    tracing::info!(rows = copied, "Tasks table migration completed (compound key)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn primary_key(conn: &mut Connection) -> Vec<String> {
        let tx = conn.transaction().unwrap();
        let key = task_primary_key(&tx).unwrap().unwrap();
        tx.commit().unwrap();
        key
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
        assert_eq!(primary_key(&mut conn), vec!["id", "token"]);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_legacy_single_key_table_is_upgraded() {
        let mut conn = setup();
        conn.execute_batch(
            "CREATE TABLE users (
                token TEXT PRIMARY KEY,
                created_at INTEGER,
                last_sync_at INTEGER
            );
            CREATE TABLE tasks (
                id TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                name TEXT NOT NULL,
                estimated_time INTEGER,
                long_cycle INTEGER,
                cycle_list TEXT,
                progress INTEGER DEFAULT 0,
                deadline INTEGER,
                completed INTEGER DEFAULT 0,
                time_up INTEGER DEFAULT 0,
                urgent INTEGER DEFAULT 0,
                important INTEGER DEFAULT 0,
                description TEXT,
                timestamp INTEGER NOT NULL
            );
            INSERT INTO tasks (id, token, name, timestamp) VALUES ('t1', 'token-A', 'A-Task', 1730000000);
            INSERT INTO tasks (id, token, name, timestamp) VALUES ('t2', 'token-B', 'B-Task', 1730000001);",
        )
        .unwrap();

        run(&mut conn).unwrap();

        assert_eq!(primary_key(&mut conn), vec!["id", "token"]);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        // the same id may now exist under another tenant
        conn.execute(
            "INSERT INTO tasks (id, token, name, timestamp) VALUES ('t1', 'token-B', 'B-Copy', 1)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_legacy_upgrade_failure_rolls_back() {
        let mut conn = setup();
        // no token column: the copy cannot succeed
        conn.execute_batch(
            "CREATE TABLE tasks (id TEXT PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO tasks (id, name) VALUES ('t1', 'Orphan');",
        )
        .unwrap();

        assert!(run(&mut conn).is_err());

        let name: String = conn
            .query_row("SELECT name FROM tasks WHERE id = 't1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Orphan");
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}

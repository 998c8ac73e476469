//! Tenant-scoped task repository

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Number, Value};

use crate::error::Result;
use crate::models::{TaskRecord, Tenant};
use crate::normalize::{coerce_int, is_truthy, task_id, task_name};
use crate::util::unix_timestamp_now;

const SELECT_TASKS: &str = "SELECT id, name, estimated_time, long_cycle, cycle_list, progress,
        deadline, completed, time_up, urgent, important, description, timestamp
     FROM tasks
     WHERE token = ?
     ORDER BY id";

/// Trait for tenant and task storage operations
///
/// Every operation is scoped by the tenant token; no method ever touches
/// rows belonging to another tenant.
pub trait TaskStore {
    /// Create the tenant if it does not exist yet
    fn ensure_tenant(&self, token: &str) -> Result<()>;

    /// Look up tenant metadata
    fn tenant(&self, token: &str) -> Result<Option<Tenant>>;

    /// Load every task of the tenant, ordered by id
    fn load_tasks(&self, token: &str) -> Result<Vec<TaskRecord>>;

    /// Delete every task of the tenant, then insert `tasks`
    ///
    /// Atomicity comes from the caller's transaction. An empty slice empties
    /// the tenant.
    fn replace_tasks(&self, token: &str, tasks: &[TaskRecord]) -> Result<()>;

    /// Record the current time as the tenant's last sync
    fn touch_last_sync(&self, token: &str) -> Result<()>;

    /// Re-read the tenant's tasks after a commit
    fn reload(&self, token: &str) -> Result<Vec<TaskRecord>> {
        self.load_tasks(token)
    }
}

/// `SQLite` implementation of `TaskStore`
///
/// Borrows a connection, so it works the same on a plain connection and on a
/// `rusqlite::Transaction`.
pub struct SqliteTaskStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaskStore<'a> {
    /// Create a new store over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a task from a database row
    ///
    /// Rows written by older servers may hold any storage class in any
    /// column, so every value goes through the same lenient coercions as
    /// client input instead of a strict typed read.
    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
        let column = |index: usize| row.get_ref(index).map(stored_value);

        Ok(TaskRecord {
            id: task_id(Some(&column(0)?)).unwrap_or_default(),
            name: task_name(Some(&column(1)?)),
            estimated_time: coerce_int(Some(&column(2)?)),
            long_cycle: is_truthy(Some(&column(3)?)),
            cycle_list: stored_text(column(4)?),
            progress: coerce_int(Some(&column(5)?)).unwrap_or(0),
            deadline: coerce_int(Some(&column(6)?)),
            completed: is_truthy(Some(&column(7)?)),
            time_up: is_truthy(Some(&column(8)?)),
            urgent: is_truthy(Some(&column(9)?)),
            important: is_truthy(Some(&column(10)?)),
            description: stored_text(column(11)?),
            timestamp: coerce_int(Some(&column(12)?)).unwrap_or_else(unix_timestamp_now),
        })
    }
}

impl TaskStore for SqliteTaskStore<'_> {
    fn ensure_tenant(&self, token: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (token, created_at) VALUES (?, strftime('%s', 'now'))
             ON CONFLICT(token) DO NOTHING",
            params![token],
        )?;
        Ok(())
    }

    fn tenant(&self, token: &str) -> Result<Option<Tenant>> {
        let tenant = self
            .conn
            .query_row(
                "SELECT token, created_at, last_sync_at FROM users WHERE token = ?",
                params![token],
                |row| {
                    Ok(Tenant {
                        token: row.get(0)?,
                        created_at: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        last_sync_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(tenant)
    }

    fn load_tasks(&self, token: &str) -> Result<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(SELECT_TASKS)?;

        let tasks = stmt
            .query_map(params![token], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    fn replace_tasks(&self, token: &str, tasks: &[TaskRecord]) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE token = ?", params![token])?;

        let mut insert = self.conn.prepare(
            "INSERT INTO tasks (id, token, name, estimated_time, long_cycle, cycle_list,
                progress, deadline, completed, time_up, urgent, important, description, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for task in tasks {
            insert.execute(params![
                task.id,
                token,
                task.name,
                task.estimated_time,
                i32::from(task.long_cycle),
                task.cycle_list,
                task.progress,
                task.deadline,
                i32::from(task.completed),
                i32::from(task.time_up),
                i32::from(task.urgent),
                i32::from(task.important),
                task.description,
                task.timestamp,
            ])?;
        }

        tracing::debug!(removed, inserted = tasks.len(), "Replaced tenant tasks");
        Ok(())
    }

    fn touch_last_sync(&self, token: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET last_sync_at = strftime('%s', 'now') WHERE token = ?",
            params![token],
        )?;
        Ok(())
    }
}

/// Lift a raw column into a JSON value; blobs and non-finite reals carry
/// nothing usable and read as null
fn stored_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
    }
}

fn stored_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        _ => None,
    }
}

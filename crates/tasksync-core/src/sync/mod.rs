//! Sync engine: read, merge, and atomically replace a tenant's tasks.
//!
//! A sync is two steps. [`SyncEngine::prepare`] snapshots the tenant's
//! stored tasks and merges the submission into them. [`SyncEngine::commit`]
//! replaces the tenant's rows with the merged set inside one immediate
//! transaction and re-reads what was stored.
//!
//! The snapshot is taken outside the write transaction. Two concurrent syncs
//! for the same tenant therefore race at commit granularity: the later
//! commit overwrites the earlier one wholesale.

use std::fmt;
use std::str::FromStr;

use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};

use crate::db::{Database, SqliteTaskStore, TaskStore};
use crate::error::{Error, Result};
use crate::merge::{merge_tasks, MergeConflict, MergeOutcome};
use crate::models::{TaskPayload, TaskRecord, WireTask};
use crate::normalize::encode_task;
use crate::util::tenant_fingerprint;

/// What an empty submission means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySyncPolicy {
    /// Read-only sync: stored tasks are kept like any unmentioned task
    #[default]
    Retain,
    /// The client has no tasks: the tenant's task list is emptied
    Clear,
}

impl EmptySyncPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Clear => "clear",
        }
    }
}

impl fmt::Display for EmptySyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EmptySyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "clear" => Ok(Self::Clear),
            other => Err(format!("unknown empty sync policy `{other}`")),
        }
    }
}

/// Engine behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOptions {
    pub empty_sync: EmptySyncPolicy,
}

/// Response body of a successful sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Every task the tenant holds after the sync
    pub tasks: Vec<TaskPayload>,
}

/// Merged task set waiting to be committed
#[derive(Debug, Clone)]
pub struct SyncPlan {
    token: String,
    tasks: Vec<TaskRecord>,
    accepted: usize,
    skipped: usize,
    conflicts: Vec<MergeConflict>,
}

impl SyncPlan {
    /// Tenant the plan belongs to
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Tasks that will replace the tenant's stored set
    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    /// Client tasks rejected because the stored version was not older
    pub fn conflicts(&self) -> &[MergeConflict] {
        &self.conflicts
    }
}

/// Tenant-scoped sync engine
///
/// Cheap to clone; holds no connection between calls.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    db: Database,
    options: SyncOptions,
}

impl SyncEngine {
    pub const fn new(db: Database, options: SyncOptions) -> Self {
        Self { db, options }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Run one full read-merge-write cycle for a tenant
    ///
    /// Either the whole merged set is stored and returned, or nothing changes.
    pub fn sync(&self, token: &str, client: &[WireTask]) -> Result<SyncResponse> {
        let plan = self.prepare(token, client)?;
        self.commit(plan)
    }

    /// Snapshot the tenant's tasks and merge the submission into them
    ///
    /// Read-only: the tenant row is created by [`SyncEngine::commit`].
    pub fn prepare(&self, token: &str, client: &[WireTask]) -> Result<SyncPlan> {
        // Tokens are opaque: only a blank one is refused, nothing is trimmed
        if token.trim().is_empty() {
            return Err(Error::MissingTenant);
        }
        let token = token.to_string();

        let conn = self.db.connect()?;
        let server = SqliteTaskStore::new(&conn).load_tasks(&token)?;

        let outcome = if client.is_empty() && self.options.empty_sync == EmptySyncPolicy::Clear {
            tracing::debug!(
                tenant = tenant_fingerprint(&token),
                cleared = server.len(),
                "Empty submission clears tenant tasks"
            );
            MergeOutcome::default()
        } else {
            merge_tasks(server, client)
        };

        for conflict in &outcome.conflicts {
            tracing::debug!(
                tenant = tenant_fingerprint(&token),
                task = %conflict.task_id,
                server_timestamp = conflict.server_timestamp,
                client_timestamp = conflict.client_timestamp,
                "Kept stored task over stale submission"
            );
        }

        Ok(SyncPlan {
            token,
            tasks: outcome.tasks,
            accepted: outcome.accepted,
            skipped: outcome.skipped,
            conflicts: outcome.conflicts,
        })
    }

    /// Atomically replace the tenant's tasks with the plan and return what
    /// was stored
    pub fn commit(&self, plan: SyncPlan) -> Result<SyncResponse> {
        let tenant = tenant_fingerprint(&plan.token);
        let mut conn = self.db.connect()?;

        Self::write(&mut conn, &plan).inspect_err(|error| {
            tracing::error!(tenant, %error, "Sync write failed; tenant state rolled back");
        })?;

        let stored = SqliteTaskStore::new(&conn).reload(&plan.token)?;
        tracing::info!(
            tenant,
            accepted = plan.accepted,
            conflicts = plan.conflicts.len(),
            skipped = plan.skipped,
            stored = stored.len(),
            "Sync committed"
        );

        Ok(SyncResponse {
            tasks: stored.iter().map(encode_task).collect(),
        })
    }

    fn write(conn: &mut rusqlite::Connection, plan: &SyncPlan) -> Result<()> {
        // IMMEDIATE takes the write lock up front; dropping `tx` rolls back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let store = SqliteTaskStore::new(&tx);
            store.ensure_tenant(&plan.token)?;
            store.replace_tasks(&plan.token, &plan.tasks)?;
            store.touch_last_sync(&plan.token)?;
        }
        tx.commit()?;
        Ok(())
    }
}

//! Last-writer-wins merge of a client submission into a tenant's task set

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{TaskRecord, WireTask};
use crate::normalize::{comparable_millis, decode_task_at, task_id, timestamp_to_millis};
use crate::util::unix_timestamp_now;

/// A client task that lost against the stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    /// Task involved in the conflict
    pub task_id: String,
    /// Stored version's timestamp (ms)
    pub server_timestamp: i64,
    /// Rejected client version's timestamp (ms)
    pub client_timestamp: i64,
}

/// Result of merging one submission
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Authoritative task set, ordered by id
    pub tasks: Vec<TaskRecord>,
    /// Client tasks that were inserted or replaced a stored task
    pub accepted: usize,
    /// Client tasks without a usable id
    pub skipped: usize,
    /// Client tasks that were not newer than the stored task
    pub conflicts: Vec<MergeConflict>,
}

/// Merge a client submission into the stored set, stamping client tasks
/// that carry no timestamp with the current time.
pub fn merge_tasks(server: Vec<TaskRecord>, client: &[WireTask]) -> MergeOutcome {
    merge_tasks_at(server, client, unix_timestamp_now())
}

/// Same as [`merge_tasks`] with an explicit fallback timestamp (seconds).
///
/// A client task replaces the stored one only when its timestamp is strictly
/// greater; ties keep the stored version. Stored tasks the client did not
/// mention are kept. Replacement is whole-record.
pub fn merge_tasks_at(server: Vec<TaskRecord>, client: &[WireTask], now_secs: i64) -> MergeOutcome {
    // Entries carry the millisecond value they won with; stored seconds
    // would lose sub-second order between duplicates of one submission.
    let mut working: BTreeMap<String, (i64, TaskRecord)> = server
        .into_iter()
        .map(|task| (task.id.clone(), (timestamp_to_millis(task.timestamp), task)))
        .collect();
    let mut outcome = MergeOutcome::default();

    for incoming in client {
        let Some(id) = task_id(incoming.id.as_ref()) else {
            outcome.skipped += 1;
            continue;
        };

        let client_timestamp = comparable_millis(incoming.timestamp.as_ref());
        if let Some(&(server_timestamp, _)) = working.get(&id) {
            if client_timestamp <= server_timestamp {
                outcome.conflicts.push(MergeConflict {
                    task_id: id,
                    server_timestamp,
                    client_timestamp,
                });
                continue;
            }
        }

        let Some(record) = decode_task_at(incoming, now_secs) else {
            outcome.skipped += 1;
            continue;
        };
        working.insert(id, (client_timestamp, record));
        outcome.accepted += 1;
    }

    outcome.tasks = working.into_values().map(|(_, task)| task).collect();
    outcome
}

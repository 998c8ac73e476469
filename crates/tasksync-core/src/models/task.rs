//! Task models in their storage and wire shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A task as stored for one tenant
///
/// Identity is the pair `(id, tenant token)`; the token is not part of the
/// record because every store operation is already scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Tenant-scoped identifier
    pub id: String,
    /// Display name, never empty
    pub name: String,
    /// Estimated effort (unit chosen by the client)
    pub estimated_time: Option<i64>,
    /// Long-cycle flag
    pub long_cycle: bool,
    /// JSON-encoded cycle list; `None` and `Some("[]")` are different states
    pub cycle_list: Option<String>,
    /// Progress counter
    pub progress: i64,
    /// Deadline (epoch-like, unit chosen by the client)
    pub deadline: Option<i64>,
    pub completed: bool,
    pub time_up: bool,
    pub urgent: bool,
    pub important: bool,
    /// Free-form description
    pub description: Option<String>,
    /// Last-modified instant (Unix seconds)
    pub timestamp: i64,
}

/// A task as submitted by a client
///
/// Every field is kept as raw JSON so malformed input survives until the
/// normalizer decides what to do with it. `null` and absent are the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireTask {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub estimated_time: Option<Value>,
    pub long_cycle: Option<Value>,
    pub cycle_list: Option<Value>,
    pub progress: Option<Value>,
    pub deadline: Option<Value>,
    pub completed: Option<Value>,
    pub time_up: Option<Value>,
    pub urgent: Option<Value>,
    pub important: Option<Value>,
    pub description: Option<Value>,
    pub timestamp: Option<Value>,
}

impl WireTask {
    /// Build a wire task from an arbitrary JSON value
    ///
    /// Returns `None` for anything that is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for WireTask {
    fn from(mut map: Map<String, Value>) -> Self {
        let mut take = |key: &str| map.remove(key).filter(|value| !value.is_null());

        let time_up = take("time_up").or_else(|| take("timeUp"));
        Self {
            id: take("id"),
            name: take("name"),
            estimated_time: take("estimatedTime"),
            long_cycle: take("longCycle"),
            cycle_list: take("cycleList"),
            progress: take("progress"),
            deadline: take("deadline"),
            completed: take("completed"),
            time_up,
            urgent: take("urgent"),
            important: take("important"),
            description: take("description"),
            timestamp: take("timestamp"),
        }
    }
}

/// A task as returned to clients
///
/// Booleans are real booleans and `timestamp` is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub id: String,
    pub name: String,
    pub estimated_time: Option<i64>,
    pub long_cycle: bool,
    pub cycle_list: Vec<Value>,
    pub progress: i64,
    pub deadline: Option<i64>,
    pub completed: bool,
    #[serde(rename = "time_up")]
    pub time_up: bool,
    pub urgent: bool,
    pub important: bool,
    pub description: Option<String>,
    pub timestamp: i64,
}

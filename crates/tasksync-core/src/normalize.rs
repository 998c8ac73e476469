//! Transcoding between client (wire) tasks and stored task records.
//!
//! Clients disagree on timestamp units and send loosely typed fields, so
//! every coercion here degrades to a safe default instead of failing:
//! current time for timestamps, `false` for flags, `[]` for cycle lists.

#![allow(clippy::cast_possible_truncation)] // float -> i64 mirrors integer truncation

use serde_json::Value;

use crate::models::{TaskPayload, TaskRecord, WireTask};
use crate::util::normalize_text_option;

/// Timestamps at or above this value are milliseconds, below it seconds.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Name stored for tasks submitted without one.
pub const UNTITLED_TASK_NAME: &str = "Untitled";

#[allow(clippy::cast_precision_loss)]
const MILLIS_THRESHOLD_F64: f64 = MILLIS_THRESHOLD as f64;

/// Decode a wire task into its storage form.
///
/// Tasks without a timestamp are stamped with `now_secs`. Returns `None`
/// only when no task id can be derived.
pub fn decode_task_at(task: &WireTask, now_secs: i64) -> Option<TaskRecord> {
    let id = task_id(task.id.as_ref())?;
    let name = task_name(task.name.as_ref());

    let cycle_list = task
        .cycle_list
        .as_ref()
        .map(Value::to_string);

    let description = task
        .description
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(TaskRecord {
        id,
        name,
        estimated_time: coerce_int(task.estimated_time.as_ref()),
        long_cycle: is_truthy(task.long_cycle.as_ref()),
        cycle_list,
        progress: coerce_int(task.progress.as_ref()).unwrap_or(0),
        deadline: coerce_int(task.deadline.as_ref()),
        completed: is_truthy(task.completed.as_ref()),
        time_up: is_truthy(task.time_up.as_ref()),
        urgent: is_truthy(task.urgent.as_ref()),
        important: is_truthy(task.important.as_ref()),
        description,
        timestamp: timestamp_to_storage(task.timestamp.as_ref()).unwrap_or(now_secs),
    })
}

/// Encode a stored record into the shape returned to clients.
pub fn encode_task(record: &TaskRecord) -> TaskPayload {
    TaskPayload {
        id: record.id.clone(),
        name: record.name.clone(),
        estimated_time: record.estimated_time,
        long_cycle: record.long_cycle,
        cycle_list: decode_cycle_list(record.cycle_list.as_deref()),
        progress: record.progress,
        deadline: record.deadline,
        completed: record.completed,
        time_up: record.time_up,
        urgent: record.urgent,
        important: record.important,
        description: record.description.clone(),
        timestamp: timestamp_to_millis(record.timestamp),
    }
}

/// Derive a task id from its wire value.
///
/// Strings are taken verbatim (empty means no id) and numbers are rendered
/// as strings. Anything else carries no usable id.
pub fn task_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Trimmed task name, or the placeholder when it is missing or blank.
pub fn task_name(value: Option<&Value>) -> String {
    normalize_text_option(value.and_then(Value::as_str))
        .unwrap_or_else(|| UNTITLED_TASK_NAME.to_string())
}

/// Convert a wire timestamp to stored seconds.
///
/// Millisecond values are floor-divided by 1000, second values are
/// truncated. `None` for anything non-numeric.
pub fn timestamp_to_storage(value: Option<&Value>) -> Option<i64> {
    let Value::Number(number) = value? else {
        return None;
    };

    if let Some(raw) = number.as_i64() {
        return Some(if raw >= MILLIS_THRESHOLD {
            raw.div_euclid(1000)
        } else {
            raw
        });
    }

    number
        .as_f64()
        .filter(|raw| raw.is_finite())
        .map(|raw| {
            if raw >= MILLIS_THRESHOLD_F64 {
                (raw / 1000.0).floor() as i64
            } else {
                raw.trunc() as i64
            }
        })
}

/// Convert a stored timestamp to milliseconds.
///
/// Legacy rows may already hold milliseconds; those pass through.
pub const fn timestamp_to_millis(stored: i64) -> i64 {
    if stored < MILLIS_THRESHOLD {
        stored.saturating_mul(1000)
    } else {
        stored
    }
}

/// Milliseconds used to order a wire timestamp against a stored one.
///
/// Missing or non-numeric values compare as 0, the oldest possible.
pub fn comparable_millis(value: Option<&Value>) -> i64 {
    let Some(Value::Number(number)) = value else {
        return 0;
    };

    if let Some(raw) = number.as_i64() {
        return timestamp_to_millis(raw);
    }

    match number.as_f64() {
        Some(raw) if raw.is_finite() && raw < MILLIS_THRESHOLD_F64 => (raw * 1000.0) as i64,
        Some(raw) if raw.is_finite() => raw as i64,
        _ => 0,
    }
}

/// Best-effort integer coercion.
///
/// Integers pass through, finite floats are truncated, numeric strings are
/// parsed after trimming and booleans become 0/1.
pub fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|raw| raw.is_finite() && raw.abs() < 9.2e18)
                .map(|raw| raw.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

/// JSON truthiness: null, `false`, zero, and empty strings, arrays or
/// objects are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|raw| raw != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

fn decode_cycle_list(stored: Option<&str>) -> Vec<Value> {
    stored
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|value| match value {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .unwrap_or_default()
}

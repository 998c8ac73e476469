//! Data models for tasksync

mod task;
mod tenant;

pub use task::{TaskPayload, TaskRecord, WireTask};
pub use tenant::Tenant;

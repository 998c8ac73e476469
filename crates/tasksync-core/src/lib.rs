//! tasksync-core - Core library for tasksync
//!
//! This crate contains the task models, the normalizer that transcodes
//! client tasks, the last-writer-wins merger, the tenant-scoped `SQLite`
//! store and the sync engine that ties them together.

pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{TaskPayload, TaskRecord, Tenant, WireTask};
pub use sync::{EmptySyncPolicy, SyncEngine, SyncOptions, SyncResponse};

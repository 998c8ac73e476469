//! Database layer for tasksync

mod connection;
mod migrations;
mod repository;

pub use connection::{Database, StoreOptions};
pub use repository::{SqliteTaskStore, TaskStore};

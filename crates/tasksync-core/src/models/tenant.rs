//! Tenant model

use serde::{Deserialize, Serialize};

/// An isolated namespace of tasks, keyed by an opaque token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Opaque token identifying the tenant
    pub token: String,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
    /// Last successful sync (Unix seconds), `None` until the first commit
    pub last_sync_at: Option<i64>,
}

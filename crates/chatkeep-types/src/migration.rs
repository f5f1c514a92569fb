use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping row for one applied schema migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: i64,
    pub description: String,
    /// SHA-256 of the SQL that was applied, lowercase hex.
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

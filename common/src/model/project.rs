use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A multi-center study as exposed by every read API.
///
/// The download secret is deliberately absent: it lives only in the
/// registry table as a salted hash and never leaves the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Latest schema version saved for the project, if any.
    pub current_schema_version: Option<i64>,
}

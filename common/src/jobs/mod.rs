use serde::{Deserialize, Serialize};

/// Progress of a background job as polled by clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    /// Percentage of work done.
    InProgress(u32),
    /// Serialized result of the job.
    Completed(String),
    Failed(String),
}

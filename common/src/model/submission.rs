use crate::model::report::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Validated,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Validated => "validated",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(SubmissionStatus::Validated),
            "failed" => Ok(SubmissionStatus::Failed),
            other => Err(format!("unknown submission status '{}'", other)),
        }
    }
}

/// One ledger row as listed for PI oversight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub id: i64,
    pub project_id: i64,
    pub center_name: String,
    pub uploader_name: Option<String>,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub schema_version: Option<i64>,
    pub row_count: usize,
    pub active: bool,
}

/// A ledger row with its audit fields and full report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub summary: SubmissionSummary,
    pub file_locator: Option<String>,
    pub superseded_by: Option<i64>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub validation_report: Option<ValidationReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub file_size_bytes: u64,
    pub file_size_kb: f64,
    pub row_count: usize,
    pub column_count: usize,
    pub column_names: Vec<String>,
}

/// What a center gets back from an upload, whether it validated or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission: SubmissionSummary,
    pub status: SubmissionStatus,
    pub file_stats: FileStats,
    pub validation_report: ValidationReport,
    pub report_url: Option<String>,
}

/// Result of re-running validation on a stored submission. Carried as the
/// JSON payload of a completed revalidation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevalidationResult {
    pub submission_id: i64,
    pub schema_version: i64,
    pub status: SubmissionStatus,
    /// Status recorded when the submission was made.
    pub recorded_status: SubmissionStatus,
    pub validation_report: ValidationReport,
}

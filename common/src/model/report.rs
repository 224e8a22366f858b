use serde::{Deserialize, Serialize};

/// Whether sensitive-data hits only warn or also fail a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensitivePolicy {
    #[default]
    #[serde(rename = "warn")]
    WarnOnly,
    #[serde(rename = "block")]
    FailClosed,
}

/// A single field-level message; multi-field failures are flattened into a
/// list of these so clients can render one line per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Row-level problem counts for one declared column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProblem {
    pub column: String,
    /// Empty cells in a required column.
    pub missing_values: usize,
    pub type_mismatches: usize,
    pub out_of_range: usize,
    pub format_violations: usize,
    pub disallowed_values: usize,
    /// Up to five 1-based data row numbers that carried a problem.
    pub sample_rows: Vec<usize>,
}

impl ColumnProblem {
    pub fn total(&self) -> usize {
        self.missing_values
            + self.type_mismatches
            + self.out_of_range
            + self.format_violations
            + self.disallowed_values
    }
}

/// A column that probably holds direct identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveHit {
    pub column: String,
    pub detector: String,
    pub reason: String,
    pub matches: usize,
    pub sampled: usize,
}

/// Result of one validation run. Always returned in full, also on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: Option<i64>,
    pub row_count: usize,
    pub column_count: usize,
    pub file_size_bytes: u64,
    pub missing_required_columns: Vec<String>,
    pub duplicate_columns: Vec<String>,
    pub blank_header_cells: usize,
    pub unknown_columns: Vec<String>,
    pub column_problems: Vec<ColumnProblem>,
    pub sensitive_hits: Vec<SensitiveHit>,
    pub sensitive_policy: SensitivePolicy,
    pub errors: Vec<FieldError>,
    pub warnings: Vec<FieldError>,
}

impl ValidationReport {
    pub fn structural_ok(&self) -> bool {
        self.missing_required_columns.is_empty()
            && self.duplicate_columns.is_empty()
            && self.blank_header_cells == 0
    }

    pub fn type_error_count(&self) -> usize {
        self.column_problems.iter().map(ColumnProblem::total).sum()
    }

    pub fn problem_for(&self, column: &str) -> Option<&ColumnProblem> {
        self.column_problems.iter().find(|p| p.column == column)
    }
}

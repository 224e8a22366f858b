//! Validation Engine.
//!
//! Given a parsed dataset and the schema version it is checked against, the
//! [`Validator`] produces a full [`ValidationReport`] and a decision:
//!
//! 1. structural check of the header (required columns present, no duplicate
//!    or blank names; undeclared columns are tolerated but reported),
//! 2. per-cell type/range/enumeration/format checks, accumulated per column,
//! 3. the sensitive-data screen,
//! 4. the decision: `validated` iff the header is sound, no cell problem was
//!    counted and, under the blocking policy, no sensitive column was found.

pub mod cells;
pub mod decode;
pub mod sensitive;
pub mod structure;

use crate::error::Result;
use crate::validation::cells::{check_cell, CellIssue};
use crate::validation::decode::Dataset;
use crate::validation::sensitive::Screen;
use crate::validation::structure::{compile, CompiledColumn};
use common::model::report::{
    ColumnProblem, FieldError, SensitivePolicy, ValidationReport,
};
use common::model::schema::SchemaStructure;
use common::model::submission::SubmissionStatus;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

const MAX_SAMPLE_ROWS: usize = 5;

pub struct Validator {
    screen: Screen,
    policy: SensitivePolicy,
    sample_rows: usize,
}

impl Validator {
    pub fn new(screen: Screen, policy: SensitivePolicy, sample_rows: usize) -> Self {
        Self {
            screen,
            policy,
            sample_rows,
        }
    }

    pub fn validate(
        &self,
        dataset: &Dataset,
        structure: &SchemaStructure,
        schema_version: Option<i64>,
    ) -> Result<(ValidationReport, SubmissionStatus)> {
        let compiled = compile(structure)?;
        let mut report = ValidationReport {
            schema_version,
            row_count: dataset.row_count(),
            column_count: dataset.column_count(),
            file_size_bytes: dataset.file_size,
            sensitive_policy: self.policy,
            ..ValidationReport::default()
        };

        let positions = check_header(dataset, structure, &mut report);

        report.column_problems = compiled
            .par_iter()
            .filter_map(|column| {
                let index = *positions.get(column.descriptor.name.as_str())?;
                let problem = check_column(column, index, dataset);
                (problem.total() > 0).then_some(problem)
            })
            .collect();
        for problem in &report.column_problems {
            report
                .errors
                .push(FieldError::new(&problem.column, describe_problem(problem)));
        }

        if dataset.ragged_rows > 0 {
            report.warnings.push(FieldError::new(
                "file",
                format!(
                    "{} rows did not have exactly {} cells",
                    dataset.ragged_rows,
                    dataset.column_count()
                ),
            ));
        }

        report.sensitive_hits = self.screen.scan(dataset, structure, self.sample_rows);
        for hit in &report.sensitive_hits {
            let entry =
                FieldError::new(&hit.column, format!("possible identifier: {}", hit.reason));
            match self.policy {
                SensitivePolicy::WarnOnly => report.warnings.push(entry),
                SensitivePolicy::FailClosed => report.errors.push(entry),
            }
        }

        let blocked =
            self.policy == SensitivePolicy::FailClosed && !report.sensitive_hits.is_empty();
        let status = if report.structural_ok() && report.type_error_count() == 0 && !blocked {
            SubmissionStatus::Validated
        } else {
            SubmissionStatus::Failed
        };
        Ok((report, status))
    }
}

/// Fills the structural part of the report and returns the first header
/// position of every non-blank column name.
fn check_header<'a>(
    dataset: &'a Dataset,
    structure: &SchemaStructure,
    report: &mut ValidationReport,
) -> HashMap<&'a str, usize> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut duplicates: Vec<String> = Vec::new();

    for (index, name) in dataset.header.iter().enumerate() {
        if name.is_empty() {
            report.blank_header_cells += 1;
            continue;
        }
        if positions.contains_key(name.as_str()) {
            if !duplicates.contains(name) {
                duplicates.push(name.clone());
            }
        } else {
            positions.insert(name, index);
        }
    }

    for column in structure.columns.iter().filter(|c| c.required) {
        if !positions.contains_key(column.name.as_str()) {
            report.missing_required_columns.push(column.name.clone());
            report
                .errors
                .push(FieldError::new(&column.name, "required column is missing"));
        }
    }
    for name in &duplicates {
        report
            .errors
            .push(FieldError::new(name, "column appears more than once in the header"));
    }
    if report.blank_header_cells > 0 {
        report.errors.push(FieldError::new(
            "header",
            format!("{} header cells are blank", report.blank_header_cells),
        ));
    }

    let declared: HashSet<&str> = structure.columns.iter().map(|c| c.name.as_str()).collect();
    let mut seen = HashSet::new();
    for name in dataset.header.iter().filter(|n| !n.is_empty()) {
        if !declared.contains(name.as_str()) && seen.insert(name.as_str()) {
            report.unknown_columns.push(name.clone());
            report
                .warnings
                .push(FieldError::new(name, "column is not declared in the schema"));
        }
    }

    report.duplicate_columns = duplicates;
    positions
}

fn check_column(column: &CompiledColumn<'_>, index: usize, dataset: &Dataset) -> ColumnProblem {
    let mut problem = ColumnProblem {
        column: column.descriptor.name.clone(),
        ..ColumnProblem::default()
    };
    for (row_number, row) in dataset.rows.iter().enumerate().map(|(i, r)| (i + 1, r)) {
        let value = row[index].as_str();
        let issue = if value.is_empty() {
            if !column.descriptor.required {
                continue;
            }
            problem.missing_values += 1;
            true
        } else {
            match check_cell(column, value) {
                None => false,
                Some(CellIssue::TypeMismatch) => {
                    problem.type_mismatches += 1;
                    true
                }
                Some(CellIssue::OutOfRange) => {
                    problem.out_of_range += 1;
                    true
                }
                Some(CellIssue::FormatViolation) => {
                    problem.format_violations += 1;
                    true
                }
                Some(CellIssue::Disallowed) => {
                    problem.disallowed_values += 1;
                    true
                }
            }
        };
        if issue && problem.sample_rows.len() < MAX_SAMPLE_ROWS {
            problem.sample_rows.push(row_number);
        }
    }
    problem
}

fn describe_problem(problem: &ColumnProblem) -> String {
    let mut parts = Vec::new();
    if problem.missing_values > 0 {
        parts.push(format!("{} missing values", problem.missing_values));
    }
    if problem.type_mismatches > 0 {
        parts.push(format!("{} type mismatches", problem.type_mismatches));
    }
    if problem.out_of_range > 0 {
        parts.push(format!("{} values out of range", problem.out_of_range));
    }
    if problem.disallowed_values > 0 {
        parts.push(format!("{} values not in the allowed set", problem.disallowed_values));
    }
    if problem.format_violations > 0 {
        parts.push(format!("{} values with the wrong format", problem.format_violations));
    }
    let rows: Vec<String> = problem.sample_rows.iter().map(usize::to_string).collect();
    format!("{} (rows {})", parts.join(", "), rows.join(", "))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn validator(policy: SensitivePolicy) -> Validator {
        Validator::new(Screen::standard().expect("detectors"), policy, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::validator;
    use super::*;
    use crate::validation::decode::parse_csv;
    use common::model::schema::{ColumnDescriptor, ColumnType};

    fn trial_schema() -> SchemaStructure {
        SchemaStructure {
            columns: vec![
                ColumnDescriptor::new("case_id", ColumnType::String, true),
                ColumnDescriptor::new("age", ColumnType::Integer, true),
            ],
        }
    }

    fn run(csv: &str, policy: SensitivePolicy) -> (ValidationReport, SubmissionStatus) {
        let ds = parse_csv(csv.as_bytes()).unwrap();
        validator(policy)
            .validate(&ds, &trial_schema(), Some(1))
            .unwrap()
    }

    #[test]
    fn conforming_file_is_validated() {
        let (report, status) = run("case_id,age\nC1,45\nC2, 50 \n", SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Validated);
        assert_eq!(report.row_count, 2);
        assert_eq!(report.column_count, 2);
        assert_eq!(report.schema_version, Some(1));
        assert!(report.errors.is_empty());
    }

    #[test]
    fn type_mismatch_is_counted_per_column() {
        let (report, status) = run("case_id,age\nC1,forty\n", SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Failed);
        let age = report.problem_for("age").unwrap();
        assert_eq!(age.type_mismatches, 1);
        assert_eq!(age.sample_rows, vec![1]);
        assert!(report.errors.iter().any(|e| e.field == "age"));
    }

    #[test]
    fn missing_required_column_is_named() {
        let (report, status) = run("case_id\nC1\n", SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Failed);
        assert_eq!(report.missing_required_columns, vec!["age"]);
        assert!(report.errors.iter().any(|e| e.field == "age"));
    }

    #[test]
    fn empty_cells_only_count_in_required_columns() {
        let mut schema = trial_schema();
        schema
            .columns
            .push(ColumnDescriptor::new("bmi", ColumnType::Decimal, false));
        let ds = parse_csv(b"case_id,age,bmi\nC1,,\nC2,3,\n").unwrap();
        let (report, status) = validator(SensitivePolicy::WarnOnly)
            .validate(&ds, &schema, Some(1))
            .unwrap();
        assert_eq!(status, SubmissionStatus::Failed);
        assert_eq!(report.problem_for("age").unwrap().missing_values, 1);
        assert!(report.problem_for("bmi").is_none());
    }

    #[test]
    fn duplicate_and_blank_headers_are_structural_errors() {
        let (report, status) = run("case_id,age,age,\nC1,1,2,x\n", SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Failed);
        assert_eq!(report.duplicate_columns, vec!["age"]);
        assert_eq!(report.blank_header_cells, 1);
    }

    #[test]
    fn unknown_columns_are_tolerated_and_reported() {
        let (report, status) = run("case_id,age,site_note\nC1,1,ok\n", SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Validated);
        assert_eq!(report.unknown_columns, vec!["site_note"]);
        assert!(report.warnings.iter().any(|w| w.field == "site_note"));
    }

    #[test]
    fn sensitive_policy_switches_between_warning_and_failure() {
        let csv = "case_id,age,patient_name\nC1,45,John Smith\n";
        let (report, status) = run(csv, SensitivePolicy::WarnOnly);
        assert_eq!(status, SubmissionStatus::Validated);
        assert!(!report.sensitive_hits.is_empty());
        assert!(report.errors.is_empty());

        let (report, status) = run(csv, SensitivePolicy::FailClosed);
        assert_eq!(status, SubmissionStatus::Failed);
        assert!(report.errors.iter().any(|e| e.field == "patient_name"));
    }

    #[test]
    fn sample_rows_are_capped() {
        let mut csv = String::from("case_id,age\n");
        for i in 0..20 {
            csv.push_str(&format!("C{},x\n", i));
        }
        let (report, _) = run(&csv, SensitivePolicy::WarnOnly);
        let age = report.problem_for("age").unwrap();
        assert_eq!(age.type_mismatches, 20);
        assert_eq!(age.sample_rows, vec![1, 2, 3, 4, 5]);
    }
}

//! Per-cell checks against a declared column.

use crate::validation::structure::CompiledColumn;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use common::model::schema::ColumnType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellIssue {
    TypeMismatch,
    OutOfRange,
    FormatViolation,
    Disallowed,
}

/// Optional sign followed by one or more ASCII digits.
pub fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Optional sign, digits, at most one `.` separator, at least one digit.
pub fn is_decimal(value: &str) -> bool {
    let body = value.strip_prefix(['+', '-']).unwrap_or(value);
    let mut digits = 0usize;
    let mut separators = 0usize;
    for b in body.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => separators += 1,
            _ => return false,
        }
    }
    digits > 0 && separators <= 1
}

/// `YYYY-MM-DD`, zero padded, and a real calendar day.
pub fn is_date(value: &str) -> bool {
    let b = value.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn is_datetime(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}

pub fn is_boolean(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no" | "1" | "0"
    )
}

fn type_matches(column_type: ColumnType, value: &str) -> bool {
    match column_type {
        ColumnType::String | ColumnType::Any | ColumnType::Enumeration => true,
        ColumnType::Integer => is_integer(value),
        ColumnType::Decimal => is_decimal(value),
        ColumnType::Date => is_date(value),
        ColumnType::DateTime => is_datetime(value),
        ColumnType::Boolean => is_boolean(value),
    }
}

/// Checks one non-empty, already trimmed cell. Later checks are skipped once
/// the type is wrong, so one bad cell counts as exactly one problem.
pub fn check_cell(column: &CompiledColumn<'_>, value: &str) -> Option<CellIssue> {
    let descriptor = column.descriptor;
    if !type_matches(descriptor.column_type, value) {
        return Some(CellIssue::TypeMismatch);
    }

    if descriptor.column_type.is_numeric() {
        if let Ok(n) = value.parse::<f64>() {
            let below = descriptor.min.is_some_and(|min| n < min);
            let above = descriptor.max.is_some_and(|max| n > max);
            if below || above {
                return Some(CellIssue::OutOfRange);
            }
        }
    }

    if let Some(allowed) = &column.allowed {
        if !allowed.contains(value) {
            return Some(CellIssue::Disallowed);
        }
    }

    if let Some(format) = &column.format {
        if !format.find(value).is_some_and(|m| m.start() == 0) {
            return Some(CellIssue::FormatViolation);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::structure::compile;
    use common::model::schema::{ColumnDescriptor, SchemaStructure};

    #[test]
    fn integer_shapes() {
        for ok in ["0", "45", "-3", "+12", "007"] {
            assert!(is_integer(ok), "{}", ok);
        }
        for bad in ["", "-", "4.0", "forty", "1e3", " 4"] {
            assert!(!is_integer(bad), "{}", bad);
        }
    }

    #[test]
    fn decimal_shapes() {
        for ok in ["1", "1.5", "-0.25", ".5", "3."] {
            assert!(is_decimal(ok), "{}", ok);
        }
        for bad in ["", ".", "1.2.3", "1,5", "abc", "+"] {
            assert!(!is_decimal(bad), "{}", bad);
        }
    }

    #[test]
    fn date_requires_fixed_format() {
        assert!(is_date("2024-02-29"));
        assert!(!is_date("2023-02-29"));
        assert!(!is_date("2024-2-9"));
        assert!(!is_date("29/02/2024"));
        assert!(is_datetime("2024-02-29 13:45:00"));
        assert!(is_datetime("2024-02-29T13:45:00+08:00"));
        assert!(!is_datetime("2024-02-29"));
    }

    #[test]
    fn range_enumeration_and_format() {
        let mut age = ColumnDescriptor::new("age", ColumnType::Integer, true);
        age.min = Some(0.0);
        age.max = Some(120.0);
        let mut stage = ColumnDescriptor::new("stage", ColumnType::Enumeration, false);
        stage.allowed_values = Some(vec!["I".into(), "II".into()]);
        let mut code = ColumnDescriptor::new("code", ColumnType::String, false);
        code.format = Some(r"[A-Z]\d{3}".into());
        let structure = SchemaStructure {
            columns: vec![age, stage, code],
        };
        let compiled = compile(&structure).unwrap();

        assert_eq!(check_cell(&compiled[0], "45"), None);
        assert_eq!(check_cell(&compiled[0], "150"), Some(CellIssue::OutOfRange));
        assert_eq!(check_cell(&compiled[0], "old"), Some(CellIssue::TypeMismatch));
        assert_eq!(check_cell(&compiled[1], "II"), None);
        assert_eq!(check_cell(&compiled[1], "IV"), Some(CellIssue::Disallowed));
        assert_eq!(check_cell(&compiled[2], "A123x"), None);
        assert_eq!(
            check_cell(&compiled[2], "xA123"),
            Some(CellIssue::FormatViolation)
        );
    }
}

//! Well-formedness of schema structures and their compiled form.

use crate::error::{Error, Result};
use common::model::report::FieldError;
use common::model::schema::{ColumnDescriptor, ColumnType, SchemaStructure};
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Parses client JSON into a typed structure. Unknown keys and types outside
/// the fixed enumeration are rejected here.
pub fn parse_structure(value: serde_json::Value) -> Result<SchemaStructure> {
    serde_json::from_value(value).map_err(|e| {
        Error::invalid_fields(
            "schema structure is malformed",
            vec![FieldError::new("structure", e.to_string())],
        )
    })
}

fn check_column(index: usize, column: &ColumnDescriptor, errors: &mut Vec<FieldError>) {
    let field = |attr: &str| format!("columns[{}].{}", index, attr);

    if column.name.trim().is_empty() {
        errors.push(FieldError::new(field("name"), "must not be empty"));
    } else if column.name.trim() != column.name {
        errors.push(FieldError::new(
            field("name"),
            "must not start or end with whitespace",
        ));
    }

    for (attr, bound) in [("min", column.min), ("max", column.max)] {
        if let Some(v) = bound {
            if !column.column_type.is_numeric() {
                errors.push(FieldError::new(
                    field(attr),
                    "only integer and decimal columns accept bounds",
                ));
            } else if !v.is_finite() {
                errors.push(FieldError::new(field(attr), "must be a finite number"));
            }
        }
    }
    if let (Some(min), Some(max)) = (column.min, column.max) {
        if min > max {
            errors.push(FieldError::new(field("min"), "must not exceed max"));
        }
    }

    match &column.allowed_values {
        Some(values) if values.is_empty() => {
            errors.push(FieldError::new(field("allowed_values"), "must not be empty"));
        }
        None if column.column_type == ColumnType::Enumeration => {
            errors.push(FieldError::new(
                field("allowed_values"),
                "enumeration columns must list their allowed values",
            ));
        }
        _ => {}
    }

    if let Some(pattern) = &column.format {
        if let Err(e) = Regex::new(pattern) {
            errors.push(FieldError::new(
                field("format"),
                format!("invalid pattern: {}", e),
            ));
        }
    }
}

/// Collects every problem in the structure rather than stopping at the first.
pub fn check_structure(structure: &SchemaStructure) -> Result<()> {
    let mut errors = Vec::new();
    if structure.columns.is_empty() {
        errors.push(FieldError::new("columns", "must contain at least one column"));
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (index, column) in structure.columns.iter().enumerate() {
        check_column(index, column, &mut errors);
        if let Some(first) = seen.insert(column.name.as_str(), index) {
            errors.push(FieldError::new(
                format!("columns[{}].name", index),
                format!("duplicates columns[{}] ('{}')", first, column.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::invalid_fields("schema structure is invalid", errors))
    }
}

/// A column descriptor with its pattern compiled and allowed set indexed.
pub struct CompiledColumn<'a> {
    pub descriptor: &'a ColumnDescriptor,
    pub format: Option<Regex>,
    pub allowed: Option<HashSet<&'a str>>,
}

pub fn compile(structure: &SchemaStructure) -> Result<Vec<CompiledColumn<'_>>> {
    structure
        .columns
        .iter()
        .map(|descriptor| {
            let format = descriptor
                .format
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| Error::invalid(format!("column '{}': {}", descriptor.name, e)))?;
            let allowed = descriptor
                .allowed_values
                .as_ref()
                .map(|values| values.iter().map(String::as_str).collect());
            Ok(CompiledColumn {
                descriptor,
                format,
                allowed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_names(err: Error) -> Vec<String> {
        match err {
            Error::InvalidInput { fields, .. } => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_aliases_into_canonical_types() {
        let s = parse_structure(json!({"columns": [
            {"name": "age", "required": true, "type": "int"},
            {"name": "bmi", "type": "float"},
            {"name": "stage", "type": "enum", "allowed_values": ["I", "II"]}
        ]}))
        .unwrap();
        assert_eq!(s.columns[0].column_type, ColumnType::Integer);
        assert_eq!(s.columns[1].column_type, ColumnType::Decimal);
        assert!(!s.columns[1].required);
        assert_eq!(s.columns[2].column_type, ColumnType::Enumeration);
        check_structure(&s).unwrap();

        let stored = serde_json::to_value(&s).unwrap();
        assert_eq!(stored["columns"][0]["type"], "integer");
    }

    #[test]
    fn rejects_unknown_types_and_keys() {
        assert!(parse_structure(json!({"columns": [{"name": "a", "type": "blob"}]})).is_err());
        assert!(parse_structure(json!({"columns": [], "extra": 1})).is_err());
        assert!(parse_structure(json!({"fields": []})).is_err());
    }

    #[test]
    fn reports_every_problem_with_its_path() {
        let s = parse_structure(json!({"columns": [
            {"name": "a", "type": "string", "min": 1},
            {"name": "a", "type": "integer", "min": 5, "max": 1},
            {"name": " ", "type": "enumeration"},
            {"name": "d", "format": "("}
        ]}))
        .unwrap();
        let fields = field_names(check_structure(&s).unwrap_err());
        assert!(fields.contains(&"columns[0].min".to_string()));
        assert!(fields.contains(&"columns[1].name".to_string()));
        assert!(fields.contains(&"columns[1].min".to_string()));
        assert!(fields.contains(&"columns[2].name".to_string()));
        assert!(fields.contains(&"columns[2].allowed_values".to_string()));
        assert!(fields.contains(&"columns[3].format".to_string()));
    }

    #[test]
    fn empty_column_list_is_invalid() {
        let s = SchemaStructure { columns: vec![] };
        assert_eq!(field_names(check_structure(&s).unwrap_err()), vec!["columns"]);
    }
}

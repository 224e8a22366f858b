use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of column types a schema may declare.
///
/// Aliases cover the spellings PIs have historically typed into the schema
/// editor (`int`, `float`, ...); they are normalised to the canonical name
/// when the structure is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "float", alias = "number")]
    Decimal,
    Date,
    DateTime,
    #[serde(alias = "enum")]
    Enumeration,
    #[serde(alias = "bool")]
    Boolean,
    Any,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }

    pub fn is_date_like(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl Default for ColumnType {
    fn default() -> Self {
        ColumnType::String
    }
}

/// One column of a schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Regular expression every non-empty cell must match from its start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Columns allowed to carry identifying data (e.g. a study-assigned case id).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub identifier_exempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            column_type,
            min: None,
            max: None,
            allowed_values: None,
            format: None,
            identifier_exempt: false,
            description: None,
        }
    }
}

/// The ordered column list a PI saves for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaStructure {
    pub columns: Vec<ColumnDescriptor>,
}

impl SchemaStructure {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// An immutable, numbered snapshot of a project's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub project_id: i64,
    pub version: i64,
    pub structure: SchemaStructure,
    pub created_at: DateTime<Utc>,
}

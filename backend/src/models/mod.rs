//! Domain models shared by every stage of the pipeline.
//!
//! - [`RawValue`] / [`RawRecord`] - one respondent row as read from the export
//! - [`FieldValue`] / [`DerivedRecord`] - one transformed row
//! - [`FieldKind`] / [`FieldGroup`] / [`FieldSpec`] - the variable dictionary
//! - [`RecordWarning`] / [`RowWarning`] - non-fatal data-quality findings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Label substituted for empty answers in text fields.
pub const NO_RESPONSE: &str = "No Response";

/// Separator used when joining multi-select labels.
pub const MULTI_SELECT_SEPARATOR: &str = ";";

/// Tokens that mark a checkbox column as selected (compared case-insensitively).
const TRUTHY_TOKENS: &[&str] = &["true", "1", "yes", "y", "x", "checked", "selected"];

// =============================================================================
// Raw input
// =============================================================================

/// A single cell of a survey export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Empty,
}

impl RawValue {
    /// Build a value from a CSV cell. Blank cells become [`RawValue::Empty`].
    pub fn from_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            RawValue::Empty
        } else {
            RawValue::Text(trimmed.to_string())
        }
    }

    /// Build a value from a JSON cell (in-memory tables, HTTP payloads).
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawValue::Empty,
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Empty),
            Value::String(s) => RawValue::from_cell(s),
            other => RawValue::Text(other.to_string()),
        }
    }

    /// True for absent answers and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual form used for table lookups and passthrough copies.
    ///
    /// Returns `None` for empty values.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RawValue::Empty => None,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then_some(Cow::Borrowed(trimmed))
            }
            RawValue::Bool(b) => Some(Cow::Owned(b.to_string())),
            RawValue::Number(n) => Some(Cow::Owned(format_number(*n))),
        }
    }

    /// Whether a checkbox column counts as selected.
    ///
    /// Exports either carry a boolean-ish token or repeat the option label in
    /// the cell, so both are accepted.
    pub fn is_truthy(&self, label: &str) -> bool {
        match self {
            RawValue::Bool(b) => *b,
            RawValue::Number(n) => *n != 0.0,
            RawValue::Text(s) => {
                let token = s.trim().to_lowercase();
                TRUTHY_TOKENS.contains(&token.as_str()) || token == label.trim().to_lowercase()
            }
            RawValue::Empty => false,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::from_cell(value)
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::from_cell(&value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// One respondent row: column identifier to raw value, in source column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    cells: IndexMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used while reading a row.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: RawValue) {
        self.cells.insert(column.into(), value);
    }

    /// Convert a JSON object into a record. Non-objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(
            object
                .iter()
                .map(|(k, v)| (k.clone(), RawValue::from_json(v)))
                .collect(),
        )
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.cells.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, RawValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

// =============================================================================
// Derived output
// =============================================================================

/// A single derived variable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Indicator(u8),
    Null,
}

impl FieldValue {
    pub fn no_response() -> Self {
        FieldValue::Text(NO_RESPONSE.to_string())
    }

    pub fn indicator(flag: bool) -> Self {
        FieldValue::Indicator(u8::from(flag))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null, or the "No Response" fallback label.
    pub fn is_non_response(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s == NO_RESPONSE,
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Cell text for tabular sinks. Null renders as an empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Indicator(i) => i.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            other => f.write_str(&other.to_cell()),
        }
    }
}

/// Storage type of a derived field, for renderers that must not quote numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text (passthrough copies, composite multi-select labels).
    Text,
    /// Number or null.
    Number,
    /// 0/1, never null.
    Indicator,
}

/// Which stage of the engine produced a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Passthrough,
    Scalar,
    Threshold,
    MultiSelect,
}

/// One entry of the variable dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub kind: FieldKind,
    pub group: FieldGroup,
    /// Raw column(s) the field is computed from.
    pub source: String,
    pub description: String,
}

/// The transformed form of one eligible respondent row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRecord {
    /// Index of the source row in the raw input.
    #[serde(skip)]
    pub row: usize,
    #[serde(flatten)]
    fields: IndexMap<String, FieldValue>,
}

impl DerivedRecord {
    pub(crate) fn new(row: usize, fields: IndexMap<String, FieldValue>) -> Self {
        Self { row, fields }
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.fields.get(id)
    }

    pub fn number(&self, id: &str) -> Option<f64> {
        self.get(id).and_then(FieldValue::as_number)
    }

    pub fn indicator(&self, id: &str) -> Option<u8> {
        match self.get(id) {
            Some(FieldValue::Indicator(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        match self.get(id) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal data-quality finding for a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordWarning {
    /// A value was present but is not a key of its mapping table.
    UnmappedValue {
        column: String,
        table: String,
        value: String,
    },
    /// A column the registry uses is absent from the record.
    MissingField { column: String },
}

impl fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordWarning::UnmappedValue { column, table, value } => {
                write!(f, "column '{}': value '{}' is not in table '{}'", column, value, table)
            }
            RecordWarning::MissingField { column } => {
                write!(f, "column '{}' is missing", column)
            }
        }
    }
}

/// A [`RecordWarning`] tagged with its source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWarning {
    pub row: usize,
    #[serde(flatten)]
    pub warning: RecordWarning,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.warning)
    }
}

/// Render a float without a trailing `.0` for whole numbers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_cells_are_empty() {
        assert_eq!(RawValue::from_cell("   "), RawValue::Empty);
        assert!(RawValue::Text("  ".into()).is_empty());
        assert_eq!(RawValue::from_cell(" Yes "), RawValue::Text("Yes".into()));
    }

    #[test]
    fn test_truthiness() {
        assert!(RawValue::Bool(true).is_truthy("Staff"));
        assert!(!RawValue::Bool(false).is_truthy("Staff"));
        assert!(RawValue::Number(1.0).is_truthy("Staff"));
        assert!(RawValue::from_cell("TRUE").is_truthy("Staff"));
        assert!(RawValue::from_cell("staff").is_truthy("Staff"));
        assert!(!RawValue::from_cell("False").is_truthy("Staff"));
        assert!(!RawValue::Empty.is_truthy("Staff"));
    }

    #[test]
    fn test_record_preserves_column_order() {
        let record = RawRecord::from_json(&json!({"Q3_2": true, "Q15": "Very satisfied"})).unwrap();
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["Q3_2", "Q15"]);
        assert_eq!(record.get("Q3_2"), Some(&RawValue::Bool(true)));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(RawRecord::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_field_value_cells() {
        assert_eq!(FieldValue::Number(45.0).to_cell(), "45");
        assert_eq!(FieldValue::Number(7.5).to_cell(), "7.5");
        assert_eq!(FieldValue::Indicator(1).to_cell(), "1");
        assert_eq!(FieldValue::Null.to_cell(), "");
        assert!(FieldValue::no_response().is_non_response());
        assert!(!FieldValue::Indicator(0).is_non_response());
    }

    #[test]
    fn test_derived_record_serializes_flat_in_order() {
        let mut fields = IndexMap::new();
        fields.insert("b".to_string(), FieldValue::Number(4.0));
        fields.insert("a".to_string(), FieldValue::Null);
        let record = DerivedRecord::new(3, fields);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"b":4.0,"a":null}"#);
    }

    #[test]
    fn test_row_warning_display() {
        let warning = RowWarning {
            row: 2,
            warning: RecordWarning::MissingField { column: "Q10".into() },
        };
        assert_eq!(warning.to_string(), "row 2: column 'Q10' is missing");
    }
}

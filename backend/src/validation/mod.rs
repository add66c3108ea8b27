//! JSON Schema validation for registry documents.
//!
//! Registry files are checked against `schemas/mapping-registry.json`
//! (JSON Schema Draft 7, embedded at compile time) before they are
//! deserialized, so a malformed file reports every problem at once instead
//! of the first serde error.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use surveyquant::validation::validate_registry_document;
//!
//! let doc = json!({
//!     "tables": [{ "key": "agree", "entries": { "Agree": 2, "Disagree": 1 } }]
//! });
//! assert!(validate_registry_document(&doc).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

const REGISTRY_SCHEMA_SOURCE: &str = include_str!("../../schemas/mapping-registry.json");

static REGISTRY_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(REGISTRY_SCHEMA_SOURCE)
        .map_err(|e| format!("Embedded registry schema is not valid JSON: {}", e))
});

/// Validate a JSON value against a schema.
///
/// Returns every violation message, not just the first.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The embedded registry schema.
pub fn registry_schema() -> Result<&'static Value, Vec<String>> {
    REGISTRY_SCHEMA.as_ref().map_err(|e| vec![e.clone()])
}

/// Validate a registry document against the embedded schema.
pub fn validate_registry_document(document: &Value) -> Result<(), Vec<String>> {
    validate(registry_schema()?, document)
}

/// Quick check against the registry schema.
pub fn is_valid_registry_document(document: &Value) -> bool {
    validate_registry_document(document).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::registry::example_registry;
    use serde_json::json;

    #[test]
    fn test_example_registry_passes_schema() {
        let document = serde_json::to_value(example_registry()).unwrap();
        assert!(is_valid_registry_document(&document));
    }

    #[test]
    fn test_empty_document_is_valid() {
        assert!(is_valid_registry_document(&json!({})));
    }

    #[test]
    fn test_bad_entry_value() {
        let document = json!({
            "tables": [{ "key": "agree", "entries": { "Agree": "two" } }]
        });
        let errors = validate_registry_document(&document).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_unknown_comparator() {
        let document = json!({
            "indicators": [{ "name": "High", "field": "Q1_Trust_Scalar", "comparator": "gte", "threshold": 4 }]
        });
        assert!(!is_valid_registry_document(&document));
    }

    #[test]
    fn test_unknown_top_level_key() {
        assert!(!is_valid_registry_document(&json!({ "tabels": [] })));
    }
}

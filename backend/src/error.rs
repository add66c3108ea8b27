//! Error types for the SurveyQuant pipeline.
//!
//! One enum per layer:
//!
//! - [`CsvError`] - survey export ingestion errors
//! - [`ConfigError`] - fatal registry / filter configuration errors
//! - [`StoreError`] - stored registry errors
//! - [`OutputError`] - dataset sink errors
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Per-record data-quality problems (unmapped values, missing columns) are
//! *not* errors; they are [`crate::models::RecordWarning`] values returned
//! next to the derived records.

use thiserror::Error;

// =============================================================================
// CSV Ingestion Errors
// =============================================================================

/// Errors while reading a survey export.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Bytes could not be decoded with the detected encoding.
    #[error("Failed to decode content as {encoding}: {message}")]
    EncodingError { encoding: String, message: String },

    /// Malformed CSV content.
    #[error("Line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Input was a JSON table that is not an array of objects.
    #[error("Invalid JSON table: {0}")]
    InvalidJson(String),

    /// Empty file.
    #[error("Survey export is empty")]
    EmptyFile,

    /// No header row.
    #[error("No headers found in survey export")]
    NoHeaders,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Fatal configuration problems, detected before any record is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two mapping tables share a key.
    #[error("Duplicate mapping table key: {0}")]
    DuplicateTable(String),

    /// Two multi-select groups share a key.
    #[error("Duplicate multi-select group key: {0}")]
    DuplicateGroup(String),

    /// Two generated variables would get the same identifier.
    #[error("Duplicate derived field identifier: {0}")]
    DuplicateField(String),

    /// A lookup or scalar field names a table that does not exist.
    #[error("Unknown mapping table '{table}' referenced by {referenced_by}")]
    UnknownTable { table: String, referenced_by: String },

    /// An indicator is computed from a scalar field that does not exist.
    #[error("Indicator '{indicator}' references unknown scalar field '{field}'")]
    UnknownScalarField { indicator: String, field: String },

    /// A multi-select group has no options.
    #[error("Multi-select group '{0}' has no options")]
    EmptyGroup(String),

    /// The filter policy references a column no input row carries.
    #[error("Filter references column '{0}' which is absent from the input")]
    UnknownFilterColumn(String),

    /// A `matches` filter carries an invalid regular expression.
    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// An environment setting has an unusable value.
    #[error("Invalid value '{value}' for {key}")]
    InvalidSetting { key: String, value: String },

    /// The registry document does not satisfy the registry JSON schema.
    #[error("Registry schema validation failed: {}", errors.join("; "))]
    Schema { errors: Vec<String> },

    /// JSON (de)serialization error.
    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Registry file could not be read.
    #[error("Failed to read registry file: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Registry Store Errors
// =============================================================================

/// Errors from the on-disk registry store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored registry not found.
    #[error("Registry not found: {0}")]
    NotFound(String),

    /// The stored document is not a valid registry.
    #[error("Invalid registry: {0}")]
    Invalid(#[from] ConfigError),

    /// IO error.
    #[error("Registry store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing the derived dataset.
#[derive(Debug, Error)]
pub enum OutputError {
    /// IO error.
    #[error("Output IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("Output CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("Output JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// Returned by [`crate::transform::pipeline::transform_csv`] and friends.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Ingestion error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry store error.
    #[error("Registry store error: {0}")]
    Store(#[from] StoreError),

    /// Output error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// No records to transform.
    #[error("No records to transform")]
    EmptyInput,

    /// No registry was supplied and none in the store matches the input columns.
    #[error("No mapping registry matches the input columns")]
    NoRegistry,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Could not bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for the registry store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for output writing.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let config_err = ConfigError::DuplicateTable("satisfaction".into());
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("satisfaction"));
    }

    #[test]
    fn test_unknown_table_format() {
        let err = ConfigError::UnknownTable {
            table: "likert".into(),
            referenced_by: "scalar field 'Q15_Satisfaction_Scalar'".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("likert"));
        assert!(msg.contains("Q15_Satisfaction_Scalar"));
    }

    #[test]
    fn test_schema_errors_joined() {
        let err = ConfigError::Schema {
            errors: vec!["missing tables".into(), "bad version".into()],
        };
        assert_eq!(
            err.to_string(),
            "Registry schema validation failed: missing tables; bad version"
        );
    }
}

//! # SurveyQuant - survey answers to analysis-ready variables
//!
//! SurveyQuant turns raw survey exports (one row per respondent, text answers
//! and checkbox columns) into a derived dataset: ordinal scalars, bracket
//! midpoints, threshold indicators and flattened multi-select fields, with
//! data-quality warnings and summary statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌────────┐   ┌────────────┐   ┌──────────────┐
//! │ Export CSV  │──▶│  Parser  │──▶│ Filter │──▶│   Engine   │──▶│   data.csv   │
//! │ (ISO/UTF8)  │   │(auto-enc)│   │        │   │ (registry) │   │ summary.json │
//! └─────────────┘   └──────────┘   └────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use surveyquant::{transform_csv, RegistrySource, TransformOptions};
//!
//! let options = TransformOptions {
//!     registry: RegistrySource::Example,
//!     ..TransformOptions::default()
//! };
//! let output = transform_csv("responses.csv".as_ref(), &options)?;
//! println!("{} records, {} warnings", output.records.len(), output.warnings.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`models`] - Raw and derived records, field values, warnings
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Registry, filter, engine, summary and pipeline
//! - [`validation`] - Registry JSON schema validation
//! - [`store`] - Stored registries
//! - [`output`] - Dataset files
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Registry store
pub mod store;

// Dataset sink
pub mod output;

// Configuration
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, OutputError, PipelineError, ServerError, StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    DerivedRecord, FieldGroup, FieldKind, FieldSpec, FieldValue, RawRecord, RawValue,
    RecordWarning, RowWarning, NO_RESPONSE,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_json_table, read_table, ParseOptions, ParseResult,
};

// =============================================================================
// Re-exports - Core
// =============================================================================

pub use transform::registry::{
    example_registry, Comparator, Lookup, MappingRegistry, MappingTable, MultiSelectGroup,
    MultiSelectOption, PassthroughField, RegistryConfig, ScalarField, ThresholdIndicator,
};
pub use transform::filter::{FilterPolicy, RecordFilter};
pub use transform::engine::{
    execute, flatten_multi_select, transform, MultiSelectOutcome, TransformOutcome,
    TransformResult,
};
pub use transform::summary::{summarize, FieldSummary, SummaryStats, TableQuality};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid_registry_document, validate, validate_registry_document};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{RegistryStore, StoredRegistry};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    format_delimiter, run, transform_bytes, transform_csv, transform_parsed, CsvInfo, PipelineOutput,
    RegistryInfo, RegistrySource, TransformOptions,
};

pub use output::{write_output_dir, OutputPaths};
pub use config::AppConfig;

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, CsvMetadata, ResponseMetadata, UploadResponse};

/// Short path for the pipeline module.
pub mod pipeline {
    pub use crate::transform::pipeline::*;
}

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}

//! Transformation module.
//!
//! - Registry: mapping tables, variable plan and dictionary
//! - Filter: record eligibility
//! - Engine: per-record transformation and multi-select flattening
//! - Summary: run statistics
//! - Pipeline: parse, resolve, transform, summarize

pub mod engine;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod summary;

pub use engine::{execute, flatten_multi_select, transform, transform_row, MultiSelectOutcome, TransformOutcome, TransformResult};
pub use filter::{FilterPolicy, RecordFilter};
pub use pipeline::*;
pub use registry::{example_registry, Lookup, MappingRegistry, MappingTable, RegistryConfig};
pub use summary::{summarize, FieldSummary, SummaryStats, TableQuality};

//! High-level pipeline: survey export in, derived dataset out.
//!
//! Combines every step:
//! 1. Parse the export (encoding and delimiter auto-detected)
//! 2. Resolve the mapping registry (file, stored id, inline JSON, built-in or
//!    best match from the registry store)
//! 3. Check the filter and registry columns against the headers
//! 4. Filter and transform
//! 5. Summarize
//!
//! # Example
//!
//! ```rust,ignore
//! use surveyquant::pipeline::{transform_csv, RegistrySource, TransformOptions};
//! use std::path::Path;
//!
//! let options = TransformOptions {
//!     registry: RegistrySource::Example,
//!     ..TransformOptions::default()
//! };
//! let output = transform_csv(Path::new("responses.csv"), &options)?;
//! println!("{} eligible respondents", output.summary.eligible_total);
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::engine::execute;
use super::filter::{FilterPolicy, RecordFilter};
use super::registry::MappingRegistry;
use super::summary::{summarize, SummaryStats};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DerivedRecord, FieldSpec, RowWarning};
use crate::parser::{parse_bytes_auto, read_table, ParseOptions, ParseResult};
use crate::store::{RegistryStore, DEFAULT_STORE_DIR};

/// Where the mapping registry comes from.
#[derive(Debug, Clone, Default)]
pub enum RegistrySource {
    /// Best compatible registry from the store.
    #[default]
    Auto,
    /// A registry JSON file.
    File(PathBuf),
    /// A stored registry id.
    Stored(String),
    /// A registry JSON document.
    Inline(String),
    /// The built-in example registry.
    Example,
}

/// Options for the pipeline
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub registry: RegistrySource,
    /// Registry store directory
    pub store_dir: PathBuf,
    pub parse: ParseOptions,
    /// Replaces the registry's own filter policy
    pub filter: Option<FilterPolicy>,
    /// Update usage statistics of a stored registry after the run
    pub record_stats: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            registry: RegistrySource::Auto,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            parse: ParseOptions::default(),
            filter: None,
            record_stats: true,
        }
    }
}

/// Input file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Registry used for a run
#[derive(Debug, Clone, Serialize)]
pub struct RegistryInfo {
    /// Store id, when the registry came from the store
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: String,
    pub description: String,
}

impl RegistryInfo {
    fn of(registry: &MappingRegistry) -> Self {
        Self {
            id: None,
            name: None,
            version: registry.version().to_string(),
            description: registry.description().to_string(),
        }
    }
}

/// Result of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Derived records, input order
    pub records: Vec<DerivedRecord>,
    pub warnings: Vec<RowWarning>,
    /// Raw row indices rejected by the filter
    pub excluded: Vec<usize>,
    /// Variable dictionary, output column order
    pub dictionary: Vec<FieldSpec>,
    pub summary: SummaryStats,
    pub registry: RegistryInfo,
    pub csv_info: CsvInfo,
    pub generated_at: String,
}

impl PipelineOutput {
    /// True when the run produced no data-quality warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Transform a survey export file.
pub fn transform_csv(path: &Path, options: &TransformOptions) -> PipelineResult<PipelineOutput> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = read_table(path, options.parse)?;
    transform_parsed(parsed, options)
}

/// Same as [`transform_csv`] for in-memory bytes.
pub fn transform_bytes(bytes: &[u8], options: &TransformOptions) -> PipelineResult<PipelineOutput> {
    log_info("📖 Reading upload...");
    let parsed = parse_bytes_auto(bytes, options.parse)?;
    transform_parsed(parsed, options)
}

/// Resolve the registry and run an already parsed export.
pub fn transform_parsed(parsed: ParseResult, options: &TransformOptions) -> PipelineResult<PipelineOutput> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows, {} columns", parsed.records.len(), parsed.headers.len()));

    let (registry, info) = resolve_registry(&parsed.headers, options)?;

    let filter = match &options.filter {
        Some(policy) => RecordFilter::new(policy.clone())?,
        None => registry.filter(),
    };

    let mut output = run(parsed, &registry, &filter)?;
    output.registry = info;

    if options.record_stats {
        if let Some(id) = &output.registry.id {
            let mut store = RegistryStore::with_dir(&options.store_dir);
            if let Err(e) = store.update_stats(id, output.is_clean()) {
                log_warning(format!("Could not update registry stats: {}", e));
            }
        }
    }

    Ok(output)
}

/// Filter, transform and summarize parsed records with a given registry.
///
/// Fails before touching any record when the filter inspects a column the
/// export does not have. Registry columns missing from the export are only
/// reported.
pub fn run(parsed: ParseResult, registry: &MappingRegistry, filter: &RecordFilter) -> PipelineResult<PipelineOutput> {
    if parsed.records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    if let Err(e) = filter.check_columns(parsed.headers.iter().map(String::as_str)) {
        log_error(e.to_string());
        return Err(e.into());
    }

    let absent = registry.check_columns(&parsed.headers);
    if !absent.is_empty() {
        log_warning(format!("{} registry column(s) absent from the export:", absent.len()));
        for column in &absent {
            log_warning_indent(column.clone(), 1);
        }
    }

    log_info(format!("🔎 Filter: {}", filter.policy().describe()));
    log_info("⚙️  Transforming...");
    let result = execute(&parsed.records, registry, filter);
    log_success(result.summary());
    report_warnings(&result.warnings);

    let summary = summarize(&parsed.records, &result.records, filter, registry, &result.warnings);
    log_success(format!(
        "{} of {} respondents eligible ({:.1}%)",
        summary.eligible_total,
        summary.raw_total,
        summary.completion_rate * 100.0
    ));

    Ok(PipelineOutput {
        records: result.records,
        warnings: result.warnings,
        excluded: result.excluded,
        dictionary: registry.fields().to_vec(),
        summary,
        registry: RegistryInfo::of(registry),
        csv_info: CsvInfo {
            encoding: parsed.encoding,
            delimiter: parsed.delimiter,
            headers: parsed.headers,
            row_count: parsed.records.len(),
        },
        generated_at: chrono::Utc::now().to_rfc3339(),
    })
}

fn resolve_registry(
    headers: &[String],
    options: &TransformOptions,
) -> PipelineResult<(MappingRegistry, RegistryInfo)> {
    let (registry, id, name) = match &options.registry {
        RegistrySource::File(path) => {
            log_info(format!("Using registry file: {}", path.display()));
            (MappingRegistry::from_file(path)?, None, None)
        }
        RegistrySource::Inline(json) => {
            log_info("Using inline registry");
            (MappingRegistry::from_json(json)?, None, None)
        }
        RegistrySource::Example => {
            log_info("Using built-in example registry");
            (MappingRegistry::example(), None, None)
        }
        RegistrySource::Stored(id) => {
            let store = RegistryStore::with_dir(&options.store_dir);
            let stored = store.get(id)?;
            log_info(format!("Using stored registry: {} ({})", stored.name, stored.id));
            (stored.load()?, Some(stored.id.clone()), Some(stored.name.clone()))
        }
        RegistrySource::Auto => {
            log_info("Looking for a compatible stored registry...");
            let store = RegistryStore::with_dir(&options.store_dir);
            let compatible = store.find_compatible(headers);
            let Some((stored, score)) = compatible.first() else {
                log_warning("No compatible registry found");
                return Err(PipelineError::NoRegistry);
            };
            log_success(format!(
                "Matched \"{}\" (columns: {:.0}%, success rate: {:.0}%)",
                stored.name,
                score * 100.0,
                stored.success_rate * 100.0
            ));
            (stored.load()?, Some(stored.id.clone()), Some(stored.name.clone()))
        }
    };

    let mut info = RegistryInfo::of(&registry);
    info.id = id;
    info.name = name;
    log_info_indent(
        format!("version {}, {} tables, {} fields", info.version, registry.tables().len(), registry.fields().len()),
        1,
    );
    Ok((registry, info))
}

fn report_warnings(warnings: &[RowWarning]) {
    if warnings.is_empty() {
        return;
    }
    log_warning(format!("{} data-quality warnings", warnings.len()));
    for warning in warnings.iter().take(5) {
        log_warning_indent(warning.to_string(), 1);
    }
    if warnings.len() > 5 {
        log_warning_indent(format!("... +{}", warnings.len() - 5), 1);
    }
}

/// Printable form of a delimiter, with tab escaped.
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

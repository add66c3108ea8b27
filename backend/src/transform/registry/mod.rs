//! Mapping Registry: validated, read-only conversion tables and variable plan.
//!
//! ```text
//! registry.json ──schema check──▶ RegistryConfig ──from_config──▶ MappingRegistry
//!                                                     │
//!                     duplicate keys / unknown refs ──┘ ConfigError (fatal)
//! ```
//!
//! A [`MappingRegistry`] never changes after construction, so one instance can
//! be shared by any number of concurrent transformations, and several
//! registries (one per instrument version) can coexist in a process.

pub mod config;
pub mod table;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;

use crate::error::ConfigError;
use crate::models::{FieldGroup, FieldKind, FieldSpec};
use crate::transform::filter::{FilterPolicy, RecordFilter};
use crate::validation::validate_registry_document;

pub use config::{
    example_registry, identifier_from_label, Comparator, MultiSelectGroup, MultiSelectOption,
    PassthroughField, RegistryConfig, ScalarField, ThresholdIndicator,
};
pub use table::{Lookup, MappingTable};

/// A scalar field with its table resolved.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedScalar {
    pub field: ScalarField,
    pub id: String,
    pub table: usize,
}

/// Validated registry.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    config: RegistryConfig,
    table_index: HashMap<String, usize>,
    scalars: Vec<ResolvedScalar>,
    dictionary: Vec<FieldSpec>,
}

impl MappingRegistry {
    /// Validate a configuration.
    ///
    /// Fails on duplicate table or group keys, unknown table or scalar
    /// references, empty multi-select groups and colliding field identifiers.
    pub fn from_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        let mut table_index = HashMap::with_capacity(config.tables.len());
        for (i, table) in config.tables.iter().enumerate() {
            if table_index.insert(table.key.clone(), i).is_some() {
                return Err(ConfigError::DuplicateTable(table.key.clone()));
            }
        }

        let mut group_keys = HashSet::new();
        for group in &config.multi_selects {
            if !group_keys.insert(group.key.as_str()) {
                return Err(ConfigError::DuplicateGroup(group.key.clone()));
            }
            if group.options.is_empty() {
                return Err(ConfigError::EmptyGroup(group.key.clone()));
            }
        }

        let mut scalars = Vec::with_capacity(config.scalars.len());
        for field in &config.scalars {
            let id = field.field_id();
            let table = *table_index.get(&field.table).ok_or_else(|| ConfigError::UnknownTable {
                table: field.table.clone(),
                referenced_by: format!("scalar field '{}'", id),
            })?;
            scalars.push(ResolvedScalar {
                field: field.clone(),
                id,
                table,
            });
        }

        for indicator in &config.indicators {
            if !scalars.iter().any(|s| s.id == indicator.field) {
                return Err(ConfigError::UnknownScalarField {
                    indicator: indicator.name.clone(),
                    field: indicator.field.clone(),
                });
            }
        }

        // Compile the filter once so a bad pattern fails here, not mid-run.
        RecordFilter::new(config.filter.clone())?;

        let dictionary = build_dictionary(&config, &scalars);
        let mut seen = HashSet::with_capacity(dictionary.len());
        for spec in &dictionary {
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::DuplicateField(spec.id.clone()));
            }
        }

        Ok(Self {
            config,
            table_index,
            scalars,
            dictionary,
        })
    }

    /// Parse, schema-check and validate a registry document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let document: Value = serde_json::from_str(json)?;
        Self::from_value(&document)
    }

    /// Schema-check and validate an already parsed document.
    pub fn from_value(document: &Value) -> Result<Self, ConfigError> {
        validate_registry_document(document).map_err(|errors| ConfigError::Schema { errors })?;
        let config: RegistryConfig = serde_json::from_value(document.clone())?;
        Self::from_config(config)
    }

    /// Load a registry file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The built-in example registry.
    pub fn example() -> Self {
        Self::from_config(example_registry())
            .unwrap_or_else(|e| unreachable!("built-in registry is invalid: {}", e))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.config.to_json()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn tables(&self) -> &[MappingTable] {
        &self.config.tables
    }

    pub fn table(&self, key: &str) -> Option<&MappingTable> {
        self.table_index.get(key).map(|&i| &self.config.tables[i])
    }

    pub fn table_keys(&self) -> impl Iterator<Item = &str> {
        self.config.tables.iter().map(|t| t.key.as_str())
    }

    /// Look a raw answer up by table key. An unknown key is a configuration error.
    pub fn lookup(&self, table: &str, raw: &str) -> Result<Lookup, ConfigError> {
        self.table(table)
            .map(|t| t.lookup(raw))
            .ok_or_else(|| ConfigError::UnknownTable {
                table: table.to_string(),
                referenced_by: "lookup".to_string(),
            })
    }

    pub fn multi_selects(&self) -> &[MultiSelectGroup] {
        &self.config.multi_selects
    }

    pub fn multi_select(&self, key: &str) -> Option<&MultiSelectGroup> {
        self.config.multi_selects.iter().find(|g| g.key == key)
    }

    pub fn passthrough(&self) -> &[PassthroughField] {
        &self.config.passthrough
    }

    pub fn indicators(&self) -> &[ThresholdIndicator] {
        &self.config.indicators
    }

    pub(crate) fn resolved_scalars(&self) -> &[ResolvedScalar] {
        &self.scalars
    }

    pub(crate) fn table_at(&self, index: usize) -> &MappingTable {
        &self.config.tables[index]
    }

    /// Default filter policy declared by the registry.
    pub fn filter_policy(&self) -> &FilterPolicy {
        &self.config.filter
    }

    /// Compiled default filter.
    pub fn filter(&self) -> RecordFilter {
        // Validated in `from_config`.
        RecordFilter::new(self.config.filter.clone()).unwrap_or_default()
    }

    /// Variable dictionary, in output order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.dictionary
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.dictionary.iter().find(|f| f.id == id)
    }

    /// Every raw column the registry reads.
    pub fn source_columns(&self) -> Vec<String> {
        self.config.source_columns()
    }

    /// Columns used by the registry but absent from a header row.
    ///
    /// Instruments legitimately vary between versions, so this is a warning
    /// list, never an error.
    pub fn check_columns(&self, headers: &[String]) -> Vec<String> {
        self.source_columns()
            .into_iter()
            .filter(|column| !headers.iter().any(|h| h == column))
            .collect()
    }
}

fn build_dictionary(config: &RegistryConfig, scalars: &[ResolvedScalar]) -> Vec<FieldSpec> {
    let mut fields = Vec::new();

    for field in &config.passthrough {
        fields.push(FieldSpec {
            id: field.field_id(),
            kind: FieldKind::Text,
            group: FieldGroup::Passthrough,
            source: field.column.clone(),
            description: format!("Original answer to {}", field.column),
        });
    }

    for scalar in scalars {
        let table = &config.tables[scalar.table];
        fields.push(FieldSpec {
            id: scalar.id.clone(),
            kind: FieldKind::Number,
            group: FieldGroup::Scalar,
            source: scalar.field.column.clone(),
            description: format!("{} via '{}': {}", scalar.field.construct, table.key, table.summary()),
        });
    }

    for indicator in &config.indicators {
        fields.push(FieldSpec {
            id: indicator.name.clone(),
            kind: FieldKind::Indicator,
            group: FieldGroup::Threshold,
            source: indicator.field.clone(),
            description: match &indicator.description {
                Some(d) => format!("{} ({})", d, indicator.rule()),
                None => indicator.rule(),
            },
        });
    }

    for group in &config.multi_selects {
        for option in &group.options {
            fields.push(FieldSpec {
                id: group.option_field_id(option),
                kind: FieldKind::Indicator,
                group: FieldGroup::MultiSelect,
                source: option.column.clone(),
                description: format!("{} selected", option.label),
            });
        }
        let columns: Vec<&str> = group.options.iter().map(|o| o.column.as_str()).collect();
        fields.push(FieldSpec {
            id: group.combined_field_id(),
            kind: FieldKind::Text,
            group: FieldGroup::MultiSelect,
            source: columns.join(", "),
            description: if group.description.is_empty() {
                format!("Selected {} options", group.key)
            } else {
                group.description.clone()
            },
        });
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_registry_is_valid() {
        let registry = MappingRegistry::example();
        assert_eq!(registry.tables().len(), 2);
        assert_eq!(
            registry.lookup("satisfaction", "Somewhat satisfied").unwrap(),
            Lookup::Mapped(4.0)
        );
        assert_eq!(
            registry.lookup("response_time", "Not applicable").unwrap(),
            Lookup::NonResponse
        );
    }

    #[test]
    fn test_unknown_table_lookup_is_config_error() {
        let registry = MappingRegistry::example();
        assert!(matches!(
            registry.lookup("likert", "Agree"),
            Err(ConfigError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut config = example_registry();
        config.tables.push(MappingTable::new("satisfaction").value("Yes", 1.0));
        let err = MappingRegistry::from_config(config).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTable(key) if key == "satisfaction"));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut config = example_registry();
        config
            .multi_selects
            .push(MultiSelectGroup::new("VascularCoverage").option("Q9_1", "Other"));
        assert!(matches!(
            MappingRegistry::from_config(config),
            Err(ConfigError::DuplicateGroup(_))
        ));
    }

    #[test]
    fn test_scalar_with_unknown_table_rejected() {
        let mut config = example_registry();
        config.scalars.push(ScalarField::new("Q20", "Trust", "trust"));
        assert!(matches!(
            MappingRegistry::from_config(config),
            Err(ConfigError::UnknownTable { table, .. }) if table == "trust"
        ));
    }

    #[test]
    fn test_indicator_with_unknown_field_rejected() {
        let mut config = example_registry();
        config.indicators.push(ThresholdIndicator::new(
            "HighTrust",
            "Q20_Trust_Scalar",
            Comparator::Ge,
            4.0,
        ));
        assert!(matches!(
            MappingRegistry::from_config(config),
            Err(ConfigError::UnknownScalarField { .. })
        ));
    }

    #[test]
    fn test_colliding_field_ids_rejected() {
        let mut config = example_registry();
        config.indicators.push(ThresholdIndicator::new(
            "Q15_Satisfaction",
            "Q15_Satisfaction_Scalar",
            Comparator::Eq,
            3.0,
        ));
        assert!(matches!(
            MappingRegistry::from_config(config),
            Err(ConfigError::DuplicateField(id)) if id == "Q15_Satisfaction"
        ));
    }

    #[test]
    fn test_dictionary_order_and_kinds() {
        let registry = MappingRegistry::example();
        let ids: Vec<&str> = registry.fields().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "Q15_Satisfaction",
                "Q10_ResponseTime",
                "Q15_Satisfaction_Scalar",
                "Q10_ResponseTime_Minutes",
                "HighSatisfaction",
                "LowSatisfaction",
                "SlowResponse",
                "VascularCoverage_Residency",
                "VascularCoverage_Staff",
                "VascularCoverage_Teleradiology",
                "VascularCoverage_Combined",
            ]
        );
        assert_eq!(registry.field("HighSatisfaction").unwrap().kind, FieldKind::Indicator);
        assert_eq!(registry.field("Q10_ResponseTime_Minutes").unwrap().kind, FieldKind::Number);
    }

    #[test]
    fn test_check_columns_is_warning_list() {
        let registry = MappingRegistry::example();
        let headers: Vec<String> = ["Finished", "Q15", "Q10", "Q3_1", "Q3_2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(registry.check_columns(&headers), vec!["Q3_3".to_string()]);
    }

    #[test]
    fn test_from_json_runs_schema_check() {
        let err = MappingRegistry::from_json(r#"{"tables": "nope"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));

        let json = example_registry().to_json().unwrap();
        let registry = MappingRegistry::from_json(&json).unwrap();
        assert_eq!(registry.version(), "2024.1");
    }
}

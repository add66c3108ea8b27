//! Registry configuration document.
//!
//! This is the serde shape of a registry file. It carries no validation;
//! [`super::MappingRegistry::from_config`] turns it into a checked registry.

use serde::{Deserialize, Serialize};

use super::table::MappingTable;
use crate::transform::filter::FilterPolicy;

/// A complete registry document: tables plus the variable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Instrument version this registry targets.
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Conversion tables, referenced by key.
    #[serde(default)]
    pub tables: Vec<MappingTable>,

    /// Raw columns copied verbatim into the output.
    #[serde(default)]
    pub passthrough: Vec<PassthroughField>,

    /// Raw columns converted through a table.
    #[serde(default)]
    pub scalars: Vec<ScalarField>,

    /// 0/1 variables derived from scalar fields.
    #[serde(default)]
    pub indicators: Vec<ThresholdIndicator>,

    /// Checkbox questions.
    #[serde(default)]
    pub multi_selects: Vec<MultiSelectGroup>,

    /// Default eligibility policy for this instrument.
    #[serde(default)]
    pub filter: FilterPolicy,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_scalar_suffix() -> String {
    "Scalar".to_string()
}

/// Verbatim copy of a raw column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassthroughField {
    pub column: String,
    /// Construct name appended to the column, e.g. `Satisfaction`.
    #[serde(default)]
    pub construct: Option<String>,
}

impl PassthroughField {
    pub fn new(column: impl Into<String>, construct: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            construct: Some(construct.into()),
        }
    }

    /// `{column}_{construct}`, or the bare column.
    pub fn field_id(&self) -> String {
        match &self.construct {
            Some(construct) => format!("{}_{}", self.column, construct),
            None => self.column.clone(),
        }
    }
}

/// A raw column looked up in a mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarField {
    pub column: String,
    pub construct: String,
    /// Key of the [`MappingTable`] to use.
    pub table: String,
    /// Unit or kind suffix, e.g. `Scalar` or `Minutes`.
    #[serde(default = "default_scalar_suffix")]
    pub suffix: String,
}

impl ScalarField {
    pub fn new(column: impl Into<String>, construct: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            construct: construct.into(),
            table: table.into(),
            suffix: default_scalar_suffix(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// `{column}_{construct}_{suffix}`.
    pub fn field_id(&self) -> String {
        format!("{}_{}_{}", self.column, self.construct, self.suffix)
    }
}

/// Comparison used by a [`ThresholdIndicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => value == threshold,
            Comparator::Ne => value != threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }
}

/// `name = 1` when `field <comparator> threshold`, else `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdIndicator {
    pub name: String,
    /// Identifier of a scalar field.
    pub field: String,
    pub comparator: Comparator,
    pub threshold: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl ThresholdIndicator {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            comparator,
            threshold,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn rule(&self) -> String {
        format!(
            "{} {} {}",
            self.field,
            self.comparator.symbol(),
            crate::models::format_number(self.threshold)
        )
    }
}

/// One checkbox of a multi-select question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSelectOption {
    /// Raw boolean column.
    pub column: String,
    /// Label shown in the composite field.
    pub label: String,
    /// Suffix for the option's indicator; derived from the label when absent.
    #[serde(default)]
    pub key: Option<String>,
}

impl MultiSelectOption {
    pub fn new(column: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            label: label.into(),
            key: None,
        }
    }

    pub fn key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => identifier_from_label(&self.label),
        }
    }
}

/// A multi-select question: ordered (column, label) pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSelectGroup {
    /// Prefix of every generated field, e.g. `VascularCoverage`.
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub options: Vec<MultiSelectOption>,
    /// When set, nothing selected yields null instead of "No Response".
    #[serde(default)]
    pub optional: bool,
}

impl MultiSelectGroup {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            options: Vec::new(),
            optional: false,
        }
    }

    pub fn option(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(MultiSelectOption::new(column, label));
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `{group}_{option key}`.
    pub fn option_field_id(&self, option: &MultiSelectOption) -> String {
        format!("{}_{}", self.key, option.key())
    }

    /// `{group}_Combined`.
    pub fn combined_field_id(&self) -> String {
        format!("{}_Combined", self.key)
    }
}

/// PascalCase identifier from a label: `"Staff radiologist"` -> `StaffRadiologist`.
pub fn identifier_from_label(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            tables: Vec::new(),
            passthrough: Vec::new(),
            scalars: Vec::new(),
            indicators: Vec::new(),
            multi_selects: Vec::new(),
            filter: FilterPolicy::All,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Every raw column the registry reads, filter column included, deduplicated.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |column: &str| {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        };

        if let Some(column) = self.filter.column() {
            push(column);
        }
        for field in &self.passthrough {
            push(&field.column);
        }
        for field in &self.scalars {
            push(&field.column);
        }
        for group in &self.multi_selects {
            for option in &group.options {
                push(&option.column);
            }
        }
        columns
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry for the emergency imaging coverage survey used in docs and tests.
pub fn example_registry() -> RegistryConfig {
    let satisfaction = MappingTable::new("satisfaction")
        .with_description("Five-point satisfaction scale")
        .value("Very dissatisfied", 1.0)
        .value("Somewhat dissatisfied", 2.0)
        .value("Neither satisfied nor dissatisfied", 3.0)
        .value("Somewhat satisfied", 4.0)
        .value("Very satisfied", 5.0)
        .non_response("No Response");

    let response_time = MappingTable::new("response_time")
        .with_description("Reported turnaround bracket, midpoint in minutes")
        .value("Less than 15 minutes", 7.5)
        .value("15–30 minutes", 22.5)
        .value("30–60 minutes", 45.0)
        .value("1–2 hours", 90.0)
        .value("More than 2 hours", 150.0)
        .non_response("Not applicable")
        .non_response("No Response");

    RegistryConfig {
        version: "2024.1".to_string(),
        description: "Emergency imaging coverage survey".to_string(),
        tables: vec![satisfaction, response_time],
        passthrough: vec![
            PassthroughField::new("Q15", "Satisfaction"),
            PassthroughField::new("Q10", "ResponseTime"),
        ],
        scalars: vec![
            ScalarField::new("Q15", "Satisfaction", "satisfaction"),
            ScalarField::new("Q10", "ResponseTime", "response_time").with_suffix("Minutes"),
        ],
        indicators: vec![
            ThresholdIndicator::new("HighSatisfaction", "Q15_Satisfaction_Scalar", Comparator::Ge, 4.0)
                .with_description("Somewhat or very satisfied"),
            ThresholdIndicator::new("LowSatisfaction", "Q15_Satisfaction_Scalar", Comparator::Le, 2.0)
                .with_description("Somewhat or very dissatisfied"),
            ThresholdIndicator::new("SlowResponse", "Q10_ResponseTime_Minutes", Comparator::Gt, 60.0)
                .with_description("Turnaround above one hour"),
        ],
        multi_selects: vec![MultiSelectGroup::new("VascularCoverage")
            .with_description("Who covers vascular imaging after hours")
            .option("Q3_1", "Residency")
            .option("Q3_2", "Staff")
            .option("Q3_3", "Teleradiology")],
        filter: FilterPolicy::completed("Finished", "True"),
    }
}

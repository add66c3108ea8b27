//! Aggregation summarizer: completion, non-response and data-quality counts.
//!
//! Read-only over its inputs. Rates over derived fields use the eligible set as
//! denominator; `raw_total` and `completion_rate` are the only statistics
//! defined over the full raw set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::filter::RecordFilter;
use super::registry::MappingRegistry;
use crate::models::{
    DerivedRecord, FieldGroup, FieldKind, FieldValue, RawRecord, RecordWarning, RowWarning,
};

/// Statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub raw_total: usize,
    pub eligible_total: usize,
    pub excluded_total: usize,
    /// `eligible_total / raw_total`.
    pub completion_rate: f64,
    /// Filter description, for reports.
    pub filter: String,
    /// One entry per derived field, dictionary order.
    pub fields: Vec<FieldSummary>,
    /// Unexpected values per mapping table (tables without any are omitted).
    pub unexpected_values: BTreeMap<String, TableQuality>,
    /// Missing-column occurrences per raw column.
    pub missing_fields: BTreeMap<String, usize>,
    pub warning_count: usize,
}

/// Response statistics for one derived field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field: String,
    pub kind: FieldKind,
    pub group: FieldGroup,
    /// Records where the field is null or the "No Response" label.
    pub non_response: usize,
    pub non_response_rate: f64,
    /// Records where an indicator is 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive: Option<usize>,
    /// Mean over non-null numeric values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

/// Unexpected values seen for one mapping table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableQuality {
    pub count: usize,
    /// Distinct offending values with their frequency.
    pub values: BTreeMap<String, usize>,
}

impl SummaryStats {
    pub fn unexpected_total(&self) -> usize {
        self.unexpected_values.values().map(|q| q.count).sum()
    }

    pub fn field(&self, id: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.field == id)
    }
}

/// Compute run statistics.
pub fn summarize(
    raw: &[RawRecord],
    derived: &[DerivedRecord],
    filter: &RecordFilter,
    registry: &MappingRegistry,
    warnings: &[RowWarning],
) -> SummaryStats {
    let raw_total = raw.len();
    let eligible_total = raw.iter().filter(|r| filter.is_eligible(r)).count();

    let fields = registry
        .fields()
        .iter()
        .map(|spec| {
            let mut non_response = 0;
            let mut positive = 0;
            let mut sum = 0.0_f64;
            let mut numeric = 0usize;

            for record in derived {
                match record.get(&spec.id) {
                    None => non_response += 1,
                    Some(value) => {
                        if value.is_non_response() {
                            non_response += 1;
                        }
                        match value {
                            FieldValue::Indicator(1) => positive += 1,
                            FieldValue::Number(n) => {
                                sum += *n;
                                numeric += 1;
                            }
                            _ => {}
                        }
                    }
                }
            }

            FieldSummary {
                field: spec.id.clone(),
                kind: spec.kind,
                group: spec.group,
                non_response,
                non_response_rate: ratio(non_response, derived.len()),
                positive: (spec.kind == FieldKind::Indicator).then_some(positive),
                mean: (numeric > 0).then(|| sum / numeric as f64),
            }
        })
        .collect();

    let mut unexpected_values: BTreeMap<String, TableQuality> = BTreeMap::new();
    let mut missing_fields: BTreeMap<String, usize> = BTreeMap::new();
    for row_warning in warnings {
        match &row_warning.warning {
            RecordWarning::UnmappedValue { table, value, .. } => {
                let quality = unexpected_values.entry(table.clone()).or_default();
                quality.count += 1;
                *quality.values.entry(value.clone()).or_default() += 1;
            }
            RecordWarning::MissingField { column } => {
                *missing_fields.entry(column.clone()).or_default() += 1;
            }
        }
    }

    SummaryStats {
        raw_total,
        eligible_total,
        excluded_total: raw_total - eligible_total,
        completion_rate: ratio(eligible_total, raw_total),
        filter: filter.policy().describe(),
        fields,
        unexpected_values,
        missing_fields,
        warning_count: warnings.len(),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::engine::execute;
    use crate::transform::filter::FilterPolicy;

    fn run(records: &[RawRecord]) -> SummaryStats {
        let registry = MappingRegistry::example();
        let filter = RecordFilter::new(FilterPolicy::completed("Finished", "True")).unwrap();
        let result = execute(records, &registry, &filter);
        summarize(records, &result.records, &filter, &registry, &result.warnings)
    }

    fn respondent(finished: &str, q15: &str, q10: &str) -> RawRecord {
        RawRecord::new()
            .with("Finished", finished)
            .with("Q15", q15)
            .with("Q10", q10)
            .with("Q3_1", true)
            .with("Q3_2", false)
            .with("Q3_3", false)
    }

    #[test]
    fn test_totals() {
        let stats = run(&[
            respondent("True", "Very satisfied", "30–60 minutes"),
            respondent("False", "Very satisfied", "30–60 minutes"),
            respondent("True", "", "Not applicable"),
            respondent("True", "Somewhat dissatisfied", "1–2 hours"),
        ]);

        assert_eq!(stats.raw_total, 4);
        assert_eq!(stats.eligible_total, 3);
        assert_eq!(stats.excluded_total, 1);
        assert!((stats.completion_rate - 0.75).abs() < 1e-9);
        assert_eq!(stats.warning_count, 0);
    }

    #[test]
    fn test_non_response_rates() {
        let stats = run(&[
            respondent("True", "Very satisfied", "30–60 minutes"),
            respondent("True", "", "Not applicable"),
        ]);

        let scalar = stats.field("Q15_Satisfaction_Scalar").unwrap();
        assert_eq!(scalar.non_response, 1);
        assert!((scalar.non_response_rate - 0.5).abs() < 1e-9);
        assert_eq!(scalar.mean, Some(5.0));

        let passthrough = stats.field("Q15_Satisfaction").unwrap();
        assert_eq!(passthrough.non_response, 1);

        let indicator = stats.field("HighSatisfaction").unwrap();
        assert_eq!(indicator.non_response, 0);
        assert_eq!(indicator.positive, Some(1));

        let residency = stats.field("VascularCoverage_Residency").unwrap();
        assert_eq!(residency.positive, Some(2));
    }

    #[test]
    fn test_unexpected_values_per_table() {
        let stats = run(&[
            respondent("True", "Totally thrilled", "30–60 minutes"),
            respondent("True", "Totally thrilled", "ages"),
            respondent("True", "Meh", "30–60 minutes"),
        ]);

        let satisfaction = &stats.unexpected_values["satisfaction"];
        assert_eq!(satisfaction.count, 3);
        assert_eq!(satisfaction.values["Totally thrilled"], 2);
        assert_eq!(satisfaction.values["Meh"], 1);
        assert_eq!(stats.unexpected_values["response_time"].count, 1);
        assert_eq!(stats.unexpected_total(), 4);
    }

    #[test]
    fn test_declared_non_response_is_not_unexpected() {
        let stats = run(&[respondent("True", "No Response", "Not applicable")]);
        assert!(stats.unexpected_values.is_empty());
        assert_eq!(stats.field("Q10_ResponseTime_Minutes").unwrap().non_response, 1);
    }

    #[test]
    fn test_missing_fields_counted() {
        let stats = run(&[RawRecord::new().with("Finished", "True").with("Q15", "Very satisfied")]);
        assert_eq!(stats.missing_fields.get("Q10"), Some(&1));
        assert_eq!(stats.missing_fields.get("Q3_1"), Some(&1));
        assert!(!stats.missing_fields.contains_key("Q15"));
    }

    #[test]
    fn test_empty_input() {
        let stats = run(&[]);
        assert_eq!(stats.raw_total, 0);
        assert_eq!(stats.completion_rate, 0.0);
        assert!(stats.fields.iter().all(|f| f.non_response_rate == 0.0));
    }
}

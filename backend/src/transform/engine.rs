//! Transformation engine.
//!
//! Turns one eligible [`RawRecord`] into a [`DerivedRecord`] using a
//! [`MappingRegistry`]. Every call is independent: no state is shared between
//! records, so batches can be fanned out freely as long as the registry is
//! shared read-only.
//!
//! Per record, in output order:
//!
//! 1. passthrough copies (`"No Response"` when empty)
//! 2. scalar lookups (number, or null for non-response / unmapped / missing)
//! 3. threshold indicators (0/1; a null scalar gives 0)
//! 4. multi-select indicators and the `;`-joined composite

use indexmap::IndexMap;
use serde::Serialize;

use super::filter::RecordFilter;
use super::registry::{Lookup, MappingRegistry, MultiSelectGroup};
use crate::models::{
    DerivedRecord, FieldValue, RawRecord, RecordWarning, RowWarning, MULTI_SELECT_SEPARATOR,
};

/// Result of transforming a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub record: DerivedRecord,
    pub warnings: Vec<RecordWarning>,
}

/// Result of transforming a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformResult {
    /// Derived records, in input order of the eligible rows.
    pub records: Vec<DerivedRecord>,
    /// Data-quality warnings, tagged with source row.
    pub warnings: Vec<RowWarning>,
    /// Row indices rejected by the filter.
    pub excluded: Vec<usize>,
}

impl TransformResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unmapped_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w.warning, RecordWarning::UnmappedValue { .. }))
            .count()
    }

    pub fn missing_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w.warning, RecordWarning::MissingField { .. }))
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Transformed: {} records, {} excluded, {} unmapped values, {} missing fields",
            self.records.len(),
            self.excluded.len(),
            self.unmapped_count(),
            self.missing_count()
        )
    }
}

/// Multi-select flattening for one group and one record.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSelectOutcome {
    /// `(field id, 0/1)` per option, in group order.
    pub selections: Vec<(String, u8)>,
    /// Composite field id.
    pub combined_id: String,
    /// Joined labels, `"No Response"`, or null for optional groups.
    pub combined: FieldValue,
    /// Option columns absent from the record.
    pub missing_columns: Vec<String>,
}

/// Transform a record that is not part of a batch (row index 0).
pub fn transform(record: &RawRecord, registry: &MappingRegistry) -> TransformOutcome {
    transform_row(0, record, registry)
}

/// Transform the record found at `row` of the input.
pub fn transform_row(row: usize, record: &RawRecord, registry: &MappingRegistry) -> TransformOutcome {
    let mut fields: IndexMap<String, FieldValue> = IndexMap::with_capacity(registry.fields().len());
    let mut warnings = Warnings::default();

    for field in registry.passthrough() {
        let value = match record.get(&field.column) {
            None => {
                warnings.missing(&field.column);
                FieldValue::no_response()
            }
            Some(raw) => raw
                .as_text()
                .map(|text| FieldValue::Text(text.into_owned()))
                .unwrap_or_else(FieldValue::no_response),
        };
        fields.insert(field.field_id(), value);
    }

    for scalar in registry.resolved_scalars() {
        let column = &scalar.field.column;
        let value = match record.get(column) {
            None => {
                warnings.missing(column);
                FieldValue::Null
            }
            Some(raw) => match raw.as_text() {
                // Blank answer: plain non-response.
                None => FieldValue::Null,
                Some(text) => {
                    let table = registry.table_at(scalar.table);
                    match table.lookup(&text) {
                        Lookup::Mapped(n) => FieldValue::Number(n),
                        Lookup::NonResponse => FieldValue::Null,
                        Lookup::Unmapped => {
                            warnings.push(RecordWarning::UnmappedValue {
                                column: column.clone(),
                                table: table.key.clone(),
                                value: text.into_owned(),
                            });
                            FieldValue::Null
                        }
                    }
                }
            },
        };
        fields.insert(scalar.id.clone(), value);
    }

    for indicator in registry.indicators() {
        let flag = fields
            .get(&indicator.field)
            .and_then(FieldValue::as_number)
            .is_some_and(|value| indicator.comparator.holds(value, indicator.threshold));
        fields.insert(indicator.name.clone(), FieldValue::indicator(flag));
    }

    for group in registry.multi_selects() {
        let outcome = flatten_multi_select(group, record);
        for column in &outcome.missing_columns {
            warnings.missing(column);
        }
        for (id, flag) in outcome.selections {
            fields.insert(id, FieldValue::Indicator(flag));
        }
        fields.insert(outcome.combined_id, outcome.combined);
    }

    TransformOutcome {
        record: DerivedRecord::new(row, fields),
        warnings: warnings.into_inner(),
    }
}

/// Flatten one multi-select question.
///
/// Output follows the group's option order, whatever the column order of the
/// record. Absent columns count as not selected.
pub fn flatten_multi_select(group: &MultiSelectGroup, record: &RawRecord) -> MultiSelectOutcome {
    let mut selections = Vec::with_capacity(group.options.len());
    let mut labels: Vec<&str> = Vec::new();
    let mut missing_columns = Vec::new();

    for option in &group.options {
        let selected = match record.get(&option.column) {
            Some(raw) => raw.is_truthy(&option.label),
            None => {
                missing_columns.push(option.column.clone());
                false
            }
        };
        if selected {
            labels.push(&option.label);
        }
        selections.push((group.option_field_id(option), u8::from(selected)));
    }

    let combined = if !labels.is_empty() {
        FieldValue::Text(labels.join(MULTI_SELECT_SEPARATOR))
    } else if group.optional {
        FieldValue::Null
    } else {
        FieldValue::no_response()
    };

    MultiSelectOutcome {
        selections,
        combined_id: group.combined_field_id(),
        combined,
        missing_columns,
    }
}

/// Filter then transform a batch, preserving input order.
pub fn execute(
    records: &[RawRecord],
    registry: &MappingRegistry,
    filter: &RecordFilter,
) -> TransformResult {
    let mut result = TransformResult::new();

    for (row, record) in records.iter().enumerate() {
        if !filter.is_eligible(record) {
            result.excluded.push(row);
            continue;
        }

        let outcome = transform_row(row, record, registry);
        result.warnings.extend(
            outcome
                .warnings
                .into_iter()
                .map(|warning| RowWarning { row, warning }),
        );
        result.records.push(outcome.record);
    }

    result
}

/// Per-record warning buffer; reports each missing column once.
#[derive(Default)]
struct Warnings {
    items: Vec<RecordWarning>,
}

impl Warnings {
    fn push(&mut self, warning: RecordWarning) {
        self.items.push(warning);
    }

    fn missing(&mut self, column: &str) {
        let seen = self.items.iter().any(
            |w| matches!(w, RecordWarning::MissingField { column: c } if c == column),
        );
        if !seen {
            self.items.push(RecordWarning::MissingField {
                column: column.to_string(),
            });
        }
    }

    fn into_inner(self) -> Vec<RecordWarning> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawValue, NO_RESPONSE};
    use crate::transform::filter::FilterPolicy;
    use crate::transform::registry::{example_registry, MappingTable, ScalarField};

    fn registry() -> MappingRegistry {
        MappingRegistry::example()
    }

    #[test]
    fn test_satisfied_respondent() {
        let record = RawRecord::new()
            .with("Q15", "Somewhat satisfied")
            .with("Q10", "30–60 minutes")
            .with("Q3_2", true);

        let derived = transform(&record, &registry()).record;

        assert_eq!(derived.number("Q15_Satisfaction_Scalar"), Some(4.0));
        assert_eq!(derived.indicator("HighSatisfaction"), Some(1));
        assert_eq!(derived.indicator("LowSatisfaction"), Some(0));
        assert_eq!(derived.number("Q10_ResponseTime_Minutes"), Some(45.0));
        assert_eq!(derived.indicator("VascularCoverage_Staff"), Some(1));
        assert_eq!(derived.indicator("VascularCoverage_Residency"), Some(0));
        assert_eq!(derived.text("VascularCoverage_Combined"), Some("Staff"));
        assert_eq!(derived.text("Q15_Satisfaction"), Some("Somewhat satisfied"));
    }

    #[test]
    fn test_declared_non_response() {
        let record = RawRecord::new()
            .with("Q15", "")
            .with("Q10", "Not applicable")
            .with("Q3_1", false)
            .with("Q3_2", false)
            .with("Q3_3", false);

        let outcome = transform(&record, &registry());
        let derived = outcome.record;

        assert_eq!(derived.get("Q15_Satisfaction_Scalar"), Some(&FieldValue::Null));
        assert_eq!(derived.indicator("HighSatisfaction"), Some(0));
        assert_eq!(derived.indicator("LowSatisfaction"), Some(0));
        assert_eq!(derived.get("Q10_ResponseTime_Minutes"), Some(&FieldValue::Null));
        assert_eq!(derived.indicator("SlowResponse"), Some(0));
        assert_eq!(derived.text("Q15_Satisfaction"), Some(NO_RESPONSE));
        assert_eq!(derived.text("Q10_ResponseTime"), Some("Not applicable"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_unexpected_value_is_flagged() {
        let record = RawRecord::new()
            .with("Q15", "Totally thrilled")
            .with("Q10", "15–30 minutes");

        let outcome = transform(&record, &registry());

        assert_eq!(outcome.record.get("Q15_Satisfaction_Scalar"), Some(&FieldValue::Null));
        assert_eq!(outcome.record.indicator("HighSatisfaction"), Some(0));
        assert!(outcome.warnings.contains(&RecordWarning::UnmappedValue {
            column: "Q15".into(),
            table: "satisfaction".into(),
            value: "Totally thrilled".into(),
        }));
    }

    #[test]
    fn test_missing_columns_reported_once() {
        let record = RawRecord::new().with("Q10", "1–2 hours");
        let outcome = transform(&record, &registry());

        let missing: Vec<&str> = outcome
            .warnings
            .iter()
            .filter_map(|w| match w {
                RecordWarning::MissingField { column } => Some(column.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec!["Q15", "Q3_1", "Q3_2", "Q3_3"]);
        assert_eq!(outcome.record.text("Q15_Satisfaction"), Some(NO_RESPONSE));
        assert_eq!(outcome.record.indicator("SlowResponse"), Some(1));
    }

    #[test]
    fn test_passthrough_never_becomes_zero_or_false() {
        let record = RawRecord::new().with("Q15", RawValue::Empty).with("Q10", false);
        let derived = transform(&record, &registry()).record;
        assert_eq!(derived.get("Q15_Satisfaction"), Some(&FieldValue::no_response()));
        assert_eq!(derived.text("Q10_ResponseTime"), Some("false"));
    }

    #[test]
    fn test_multi_select_order_follows_group() {
        let group = MultiSelectGroup::new("Coverage")
            .option("C1", "Residency")
            .option("C2", "Staff")
            .option("C3", "Teleradiology");
        let record = RawRecord::new()
            .with("C3", "Yes")
            .with("C2", "")
            .with("C1", "1");

        let outcome = flatten_multi_select(&group, &record);

        assert_eq!(outcome.combined, FieldValue::Text("Residency;Teleradiology".into()));
        assert_eq!(
            outcome.selections,
            vec![
                ("Coverage_Residency".to_string(), 1),
                ("Coverage_Staff".to_string(), 0),
                ("Coverage_Teleradiology".to_string(), 1),
            ]
        );
        assert!(outcome.missing_columns.is_empty());
    }

    #[test]
    fn test_multi_select_fallbacks() {
        let group = MultiSelectGroup::new("Coverage").option("C1", "Residency");
        let record = RawRecord::new().with("C1", false);
        assert_eq!(flatten_multi_select(&group, &record).combined, FieldValue::no_response());

        let optional = group.clone().optional();
        assert_eq!(flatten_multi_select(&optional, &record).combined, FieldValue::Null);

        let outcome = flatten_multi_select(&group, &RawRecord::new());
        assert_eq!(outcome.missing_columns, vec!["C1".to_string()]);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let record = RawRecord::new()
            .with("Q3_3", "Teleradiology")
            .with("Q15", "Very satisfied")
            .with("Q10", "More than 2 hours")
            .with("Q3_1", true);
        let registry = registry();

        let first = serde_json::to_string(&transform(&record, &registry).record).unwrap();
        for _ in 0..5 {
            let again = serde_json::to_string(&transform(&record, &registry).record).unwrap();
            assert_eq!(first, again);
        }
        let rebuilt = MappingRegistry::from_config(example_registry()).unwrap();
        assert_eq!(first, serde_json::to_string(&transform(&record, &rebuilt).record).unwrap());
    }

    #[test]
    fn test_non_response_sentinel_never_propagates_to_indicator() {
        let mut config = example_registry();
        config.tables.push(
            MappingTable::new("agree")
                .value("Agree", 2.0)
                .non_response("Prefer not to say"),
        );
        config.scalars.push(ScalarField::new("Q20", "Agreement", "agree"));
        config.indicators.push(crate::transform::registry::ThresholdIndicator::new(
            "Disagrees",
            "Q20_Agreement_Scalar",
            crate::transform::registry::Comparator::Lt,
            2.0,
        ));
        let registry = MappingRegistry::from_config(config).unwrap();

        let derived = transform(&RawRecord::new().with("Q20", "Prefer not to say"), &registry).record;
        assert_eq!(derived.get("Q20_Agreement_Scalar"), Some(&FieldValue::Null));
        assert_eq!(derived.get("Disagrees"), Some(&FieldValue::Indicator(0)));
    }

    #[test]
    fn test_execute_filters_and_keeps_order() {
        let registry = registry();
        let filter = RecordFilter::new(FilterPolicy::completed("Finished", "True")).unwrap();
        let records = vec![
            RawRecord::new().with("Finished", "True").with("Q15", "Very satisfied"),
            RawRecord::new().with("Finished", "False").with("Q15", "Very dissatisfied"),
            RawRecord::new().with("Finished", "True").with("Q15", "Totally thrilled"),
        ];

        let result = execute(&records, &registry, &filter);

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.excluded, vec![1]);
        assert_eq!(result.records.len() + result.excluded.len(), records.len());
        assert_eq!(result.records[0].row, 0);
        assert_eq!(result.records[1].row, 2);
        assert_eq!(result.records[0].number("Q15_Satisfaction_Scalar"), Some(5.0));
        assert_eq!(result.unmapped_count(), 1);
        assert!(result
            .warnings
            .iter()
            .all(|w| w.row == 0 || w.row == 2));
    }

    #[test]
    fn test_field_order_matches_dictionary() {
        let registry = registry();
        let derived = transform(&RawRecord::new(), &registry).record;
        let ids: Vec<&str> = derived.field_ids().collect();
        let expected: Vec<&str> = registry.fields().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, expected);
    }
}

//! Dataset sink: writes a transformed run to an output directory.
//!
//! | File             | Content                                      |
//! |------------------|----------------------------------------------|
//! | `data.csv`       | derived records, dictionary column order     |
//! | `dictionary.csv` | field id, kind, group, source, description   |
//! | `summary.json`   | run metadata and [`SummaryStats`]            |
//! | `warnings.csv`   | one line per data-quality warning            |
//!
//! Numbers are written unquoted and null becomes an empty cell.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::OutputResult;
use crate::models::{DerivedRecord, FieldSpec, RecordWarning, RowWarning};
use crate::transform::pipeline::PipelineOutput;

/// Files produced by [`write_output_dir`].
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub data: PathBuf,
    pub dictionary: PathBuf,
    pub summary: PathBuf,
    pub warnings: PathBuf,
}

/// Derived records as CSV, one column per dictionary entry.
pub fn write_data_csv<W: Write>(
    writer: W,
    fields: &[FieldSpec],
    records: &[DerivedRecord],
) -> OutputResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(fields.iter().map(|f| f.id.as_str()))?;

    for record in records {
        csv.write_record(
            fields
                .iter()
                .map(|f| record.get(&f.id).map(|v| v.to_cell()).unwrap_or_default()),
        )?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_dictionary_csv<W: Write>(writer: W, fields: &[FieldSpec]) -> OutputResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["field", "kind", "group", "source", "description"])?;

    for field in fields {
        csv.write_record([
            field.id.as_str(),
            kind_label(field),
            group_label(field),
            field.source.as_str(),
            field.description.as_str(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_warnings_csv<W: Write>(writer: W, warnings: &[RowWarning]) -> OutputResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["row", "kind", "column", "table", "value"])?;

    for w in warnings {
        let row = w.row.to_string();
        match &w.warning {
            RecordWarning::UnmappedValue { column, table, value } => {
                csv.write_record([row.as_str(), "unmapped_value", column.as_str(), table.as_str(), value.as_str()])?
            }
            RecordWarning::MissingField { column } => {
                csv.write_record([row.as_str(), "missing_field", column.as_str(), "", ""])?
            }
        }
    }

    csv.flush()?;
    Ok(())
}

/// Write every file of a run into `dir`, creating it if needed.
pub fn write_output_dir(dir: &Path, output: &PipelineOutput) -> OutputResult<OutputPaths> {
    fs::create_dir_all(dir)?;

    let paths = OutputPaths {
        data: dir.join("data.csv"),
        dictionary: dir.join("dictionary.csv"),
        summary: dir.join("summary.json"),
        warnings: dir.join("warnings.csv"),
    };

    write_data_csv(fs::File::create(&paths.data)?, &output.dictionary, &output.records)?;
    write_dictionary_csv(fs::File::create(&paths.dictionary)?, &output.dictionary)?;
    write_warnings_csv(fs::File::create(&paths.warnings)?, &output.warnings)?;

    let summary = json!({
        "generated_at": output.generated_at,
        "source": output.csv_info,
        "registry": output.registry,
        "summary": output.summary,
    });
    fs::write(&paths.summary, serde_json::to_string_pretty(&summary)?)?;

    Ok(paths)
}

fn kind_label(field: &FieldSpec) -> &'static str {
    use crate::models::FieldKind::*;
    match field.kind {
        Text => "text",
        Number => "number",
        Indicator => "indicator",
    }
}

fn group_label(field: &FieldSpec) -> &'static str {
    use crate::models::FieldGroup::*;
    match field.group {
        Passthrough => "passthrough",
        Scalar => "scalar",
        Threshold => "threshold",
        MultiSelect => "multi_select",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::transform::engine::execute;
    use crate::transform::registry::MappingRegistry;
    use crate::transform::filter::RecordFilter;

    fn sample() -> (MappingRegistry, Vec<DerivedRecord>, Vec<RowWarning>) {
        let registry = MappingRegistry::example();
        let records = vec![
            RawRecord::new()
                .with("Finished", "True")
                .with("Q15", "Somewhat satisfied")
                .with("Q10", "30–60 minutes")
                .with("Q3_1", false)
                .with("Q3_2", true)
                .with("Q3_3", true),
            RawRecord::new()
                .with("Finished", "True")
                .with("Q15", "Totally thrilled")
                .with("Q10", "")
                .with("Q3_1", false)
                .with("Q3_2", false),
        ];
        let result = execute(&records, &registry, &RecordFilter::all());
        (registry, result.records, result.warnings)
    }

    fn to_string(f: impl FnOnce(&mut Vec<u8>) -> OutputResult<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_data_csv_layout() {
        let (registry, records, _) = sample();
        let out = to_string(|buf| write_data_csv(buf, registry.fields(), &records));
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Q15_Satisfaction,Q10_ResponseTime,Q15_Satisfaction_Scalar"));
        assert!(lines[1].contains(",4,45,1,0,0,0,1,1,Staff;Teleradiology"));
        // null scalars are empty cells, indicators stay 0
        assert!(lines[2].starts_with("Totally thrilled,No Response,,,0,0,0,0,0,0,No Response"));
    }

    #[test]
    fn test_dictionary_csv() {
        let (registry, _, _) = sample();
        let out = to_string(|buf| write_dictionary_csv(buf, registry.fields()));
        let mut lines = out.lines();

        assert_eq!(lines.next(), Some("field,kind,group,source,description"));
        assert_eq!(out.lines().count(), registry.fields().len() + 1);
        assert!(out.contains("HighSatisfaction,indicator,threshold,"));
        assert!(out.contains("VascularCoverage_Combined,text,multi_select,"));
    }

    #[test]
    fn test_warnings_csv() {
        let (_, _, warnings) = sample();
        let out = to_string(|buf| write_warnings_csv(buf, &warnings));
        assert!(out.contains("1,unmapped_value,Q15,satisfaction,Totally thrilled"));
        assert!(out.contains("1,missing_field,Q3_3,,"));
    }
}

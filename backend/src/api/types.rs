//! REST API response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{DerivedRecord, FieldSpec, RowWarning};
use crate::transform::pipeline::{PipelineOutput, RegistryInfo};
use crate::transform::summary::SummaryStats;

/// Warnings returned inline; the summary always carries the full counts.
pub const MAX_INLINE_WARNINGS: usize = 100;

/// Response sent after an upload is transformed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    /// "ready" when the run is clean, "warning" otherwise
    pub status: String,
    pub records: Vec<DerivedRecord>,
    pub dictionary: Vec<FieldSpec>,
    pub summary: SummaryStats,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub generated_at: String,
    pub registry: RegistryInfo,
    pub csv_info: CsvMetadata,
    pub warnings: Vec<RowWarning>,
    pub warnings_truncated: bool,
    pub excluded_rows: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<PipelineOutput> for UploadResponse {
    fn from(output: PipelineOutput) -> Self {
        let status = if output.is_clean() { "ready" } else { "warning" };
        let warnings_truncated = output.warnings.len() > MAX_INLINE_WARNINGS;
        let mut warnings = output.warnings;
        warnings.truncate(MAX_INLINE_WARNINGS);

        UploadResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            records: output.records,
            dictionary: output.dictionary,
            summary: output.summary,
            metadata: ResponseMetadata {
                generated_at: output.generated_at,
                registry: output.registry,
                csv_info: CsvMetadata {
                    encoding: output.csv_info.encoding,
                    delimiter: output.csv_info.delimiter.to_string(),
                    row_count: output.csv_info.row_count,
                    columns: output.csv_info.headers,
                },
                warnings,
                warnings_truncated,
                excluded_rows: output.excluded,
            },
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "records": [],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pipeline::{transform_bytes, RegistrySource, TransformOptions};

    fn options() -> TransformOptions {
        TransformOptions {
            registry: RegistrySource::Example,
            record_stats: false,
            ..TransformOptions::default()
        }
    }

    #[test]
    fn test_upload_response_shape() {
        let csv = "Finished,Q15,Q10,Q3_1,Q3_2,Q3_3\nTrue,Very satisfied,Less than 15 minutes,1,0,0\n";
        let output = transform_bytes(csv.as_bytes(), &options()).unwrap();
        let json = serde_json::to_value(UploadResponse::from(output)).unwrap();

        assert_eq!(json["status"], "ready");
        assert_eq!(json["records"][0]["Q15_Satisfaction_Scalar"], 5.0);
        assert_eq!(json["records"][0]["VascularCoverage_Combined"], "Residency");
        assert_eq!(json["metadata"]["csvInfo"]["delimiter"], ",");
        assert_eq!(json["metadata"]["registry"]["version"], "2024.1");
        assert_eq!(json["summary"]["eligible_total"], 1);
    }

    #[test]
    fn test_warning_status_and_truncation() {
        let mut csv = String::from("Finished,Q15\n");
        for _ in 0..(MAX_INLINE_WARNINGS + 10) {
            csv.push_str("True,Totally thrilled\n");
        }
        let output = transform_bytes(csv.as_bytes(), &options()).unwrap();
        let response = UploadResponse::from(output);

        assert_eq!(response.status, "warning");
        assert!(response.metadata.warnings_truncated);
        assert_eq!(response.metadata.warnings.len(), MAX_INLINE_WARNINGS);
        assert!(response.summary.warning_count > MAX_INLINE_WARNINGS);
    }

    #[test]
    fn test_error_response() {
        let body = error_response("No file provided");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "No file provided");
    }
}

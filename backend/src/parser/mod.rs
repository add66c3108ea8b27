//! Survey export reader with encoding and delimiter auto-detection.
//!
//! Produces ordered [`RawRecord`]s. No survey-specific logic lives here; the
//! only concession to survey tools is `skip_rows`, which drops the extra
//! question-text / import-id rows some platforms put under the header.

use std::path::Path;

use serde_json::Value;

use crate::error::CsvError;
use crate::models::{RawRecord, RawValue};

/// Parsed export plus detection metadata.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub records: Vec<RawRecord>,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Reader options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Force a delimiter instead of detecting one.
    pub delimiter: Option<char>,
    /// Data rows to drop right after the header.
    pub skip_rows: usize,
}

/// Detect the encoding of raw bytes.
///
/// A UTF-16 BOM wins, then any input that is valid UTF-8 is taken as UTF-8.
/// chardet only guesses for the rest, since it misreads short UTF-8 exports
/// with a few multi-byte characters as Latin-1.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return "utf-16".to_string();
    }
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if std::str::from_utf8(body).is_ok() {
        return "utf-8".to_string();
    }

    let (charset, _confidence, _language) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "utf-16le" | "utf-16be" | "utf-16" => "utf-16".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with a named encoding. A leading BOM is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> Result<String, CsvError> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        // WHATWG maps the latin1 labels to windows-1252.
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        "utf-16" => {
            // `decode` sniffs the BOM and switches to the right endianness.
            let (text, _, had_errors) = encoding_rs::UTF_16LE.decode(bytes);
            if had_errors {
                return Err(CsvError::EncodingError {
                    encoding: encoding.to_string(),
                    message: "invalid UTF-16 sequence".to_string(),
                });
            }
            text.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Pick the delimiter that occurs most often in the header line.
pub fn detect_delimiter(content: &str) -> char {
    let header = content.lines().next().unwrap_or("");

    [',', ';', '\t', '|']
        .into_iter()
        .map(|sep| (sep, header.matches(sep).count()))
        .filter(|&(_, count)| count > 0)
        .max_by_key(|&(_, count)| count)
        .map(|(sep, _)| sep)
        .unwrap_or(',')
}

/// Parse decoded CSV content.
pub fn parse_str(content: &str, delimiter: char, options: ParseOptions) -> Result<(Vec<String>, Vec<RawRecord>), CsvError> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let delimiter = u8::try_from(delimiter).map_err(|_| CsvError::ParseError {
        line: 1,
        message: format!("delimiter '{}' is not a single byte", delimiter),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        if index < options.skip_rows {
            continue;
        }
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let record: RawRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = row.get(i).map(RawValue::from_cell).unwrap_or(RawValue::Empty);
                (header.clone(), value)
            })
            .collect();
        records.push(record);
    }

    Ok((headers, records))
}

/// Parse raw bytes, detecting encoding and (unless forced) the delimiter.
pub fn parse_bytes_auto(bytes: &[u8], options: ParseOptions) -> Result<ParseResult, CsvError> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(&content));
    let (headers, records) = parse_str(&content, delimiter, options)?;

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse a CSV file from disk.
pub fn parse_csv_file_auto(path: impl AsRef<Path>, options: ParseOptions) -> Result<ParseResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, options)
}

/// Read an in-memory table given as a JSON array of objects.
pub fn parse_json_table(content: &str) -> Result<ParseResult, CsvError> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| CsvError::InvalidJson(e.to_string()))?;
    let rows = value
        .as_array()
        .ok_or_else(|| CsvError::InvalidJson("expected an array of objects".to_string()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let record = RawRecord::from_json(row)
            .ok_or_else(|| CsvError::InvalidJson(format!("row {} is not an object", i)))?;
        for column in record.columns() {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
        records.push(record);
    }

    Ok(ParseResult {
        records,
        encoding: "utf-8".to_string(),
        delimiter: ',',
        headers,
    })
}

/// Read a survey export from disk, choosing the reader from the extension.
pub fn read_table(path: impl AsRef<Path>, options: ParseOptions) -> Result<ParseResult, CsvError> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let content = std::fs::read_to_string(path)?;
        parse_json_table(&content)
    } else {
        parse_csv_file_auto(path, options)
    }
}

fn csv_error(err: csv::Error) -> CsvError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    CsvError::ParseError {
        line,
        message: err.to_string(),
    }
}

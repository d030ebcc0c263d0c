use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app::ports::{RecordSourcePort, SkippedRecord, SourceBatch};
use crate::domain::RawRecord;
use crate::error::{QualityError, Result};
use crate::pipeline::processing::normalize::record_id_for;

/// Input file layouts understood by [`FileRecordSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Header row followed by one record per row
    Csv,
    /// An array of objects, or an object holding one under `data` or `items`
    Json,
    /// One JSON object per line
    Jsonl,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            "jsonl" | "ndjson" => Ok(InputFormat::Jsonl),
            other => Err(QualityError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Reads collector output from a CSV, JSON or JSONL file
pub struct FileRecordSource {
    path: PathBuf,
    format: InputFormat,
    id_field: String,
}

impl FileRecordSource {
    pub fn new(path: impl Into<PathBuf>, id_field: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let format = InputFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            id_field: id_field.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }
}

#[async_trait]
impl RecordSourcePort for FileRecordSource {
    async fn read_records(&self) -> anyhow::Result<SourceBatch> {
        info!(path = %self.path.display(), format = ?self.format, "Reading input records");
        let content = fs::read_to_string(&self.path)?;
        let batch = parse_records(&content, self.format, &self.id_field)?;
        info!(
            records = batch.records.len(),
            skipped = batch.skipped.len(),
            "Read input records"
        );
        Ok(batch)
    }
}

/// Parse a whole input document. Malformed rows are skipped but still consume a
/// position, so positional ids stay stable when a row is fixed later.
pub fn parse_records(content: &str, format: InputFormat, id_field: &str) -> Result<SourceBatch> {
    match format {
        InputFormat::Csv => parse_csv(content, id_field),
        InputFormat::Json => parse_json(content, id_field),
        InputFormat::Jsonl => Ok(parse_jsonl(content, id_field)),
    }
}

fn parse_csv(content: &str, id_field: &str) -> Result<SourceBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut batch = SourceBatch::default();
    for (index, row) in reader.records().enumerate() {
        let position = index + 1;
        match row {
            Ok(row) => {
                let fields: Map<String, Value> = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
                    .collect();
                push_record(&mut batch, fields, id_field, position);
            }
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(position + 1);
                debug!(line, error = %e, "Malformed CSV row");
                batch.skipped.push(SkippedRecord { line, reason: e.to_string() });
            }
        }
    }
    Ok(batch)
}

fn parse_json(content: &str, id_field: &str) -> Result<SourceBatch> {
    let document: Value = serde_json::from_str(content)?;
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("data").or_else(|| object.remove("items")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(QualityError::UnsupportedFormat(
                    "JSON object without a 'data' or 'items' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(QualityError::UnsupportedFormat(
                "JSON input must be an array of records".to_string(),
            ))
        }
    };

    let mut batch = SourceBatch::default();
    for (index, item) in items.into_iter().enumerate() {
        let position = index + 1;
        match item {
            Value::Object(fields) => push_record(&mut batch, fields, id_field, position),
            other => batch.skipped.push(SkippedRecord {
                line: position,
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }
    Ok(batch)
}

fn parse_jsonl(content: &str, id_field: &str) -> SourceBatch {
    let mut batch = SourceBatch::default();
    let mut position = 0;
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        position += 1;
        let line_number = index + 1;
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(fields)) => push_record(&mut batch, fields, id_field, position),
            Ok(other) => batch.skipped.push(SkippedRecord {
                line: line_number,
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(e) => batch.skipped.push(SkippedRecord {
                line: line_number,
                reason: format!("invalid JSON: {}", e),
            }),
        }
    }
    batch
}

fn push_record(batch: &mut SourceBatch, fields: Map<String, Value>, id_field: &str, position: usize) {
    let id = record_id_for(&fields, id_field, position);
    batch.records.push(RawRecord::new(id, fields));
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(batch: &SourceBatch) -> Vec<&str> {
        batch.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a.CSV")).unwrap(), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("a.ndjson")).unwrap(), InputFormat::Jsonl);
        assert!(InputFormat::from_path(Path::new("a.xlsx")).is_err());
    }

    #[test]
    fn test_jsonl_skips_malformed_lines_but_keeps_positions() {
        let content = "{\"name\": \"a\"}\nnot json\n\n[1, 2]\n{\"id\": \"x-9\", \"name\": \"b\"}\n{\"name\": \"c\"}\n";
        let batch = parse_records(content, InputFormat::Jsonl, "id").unwrap();

        assert_eq!(ids(&batch), vec!["row-1", "x-9", "row-5"]);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].line, 2);
        assert!(batch.skipped[0].reason.starts_with("invalid JSON"));
        assert_eq!(batch.skipped[1].line, 4);
    }

    #[test]
    fn test_json_accepts_array_and_wrapped_objects() {
        let array = parse_records(r#"[{"name": "a"}, 3]"#, InputFormat::Json, "id").unwrap();
        assert_eq!(ids(&array), vec!["row-1"]);
        assert_eq!(array.skipped[0].reason, "expected a JSON object, found a number");

        let wrapped = parse_records(r#"{"items": [{"id": 7}]}"#, InputFormat::Json, "id").unwrap();
        assert_eq!(ids(&wrapped), vec!["7"]);

        assert!(parse_records(r#"{"rows": []}"#, InputFormat::Json, "id").is_err());
    }

    #[test]
    fn test_csv_keeps_header_order_and_cells_as_text() {
        let content = "name,full_address,tags\nCafe X,Street 1,coffee;cake\nCafe Y,,\n";
        let batch = parse_records(content, InputFormat::Csv, "id").unwrap();

        assert_eq!(ids(&batch), vec!["row-1", "row-2"]);
        let keys: Vec<_> = batch.records[0].fields.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "full_address", "tags"]);
        assert_eq!(batch.records[1].fields["full_address"], Value::String(String::new()));
    }

    #[test]
    fn test_csv_row_with_wrong_width_is_skipped() {
        let content = "name,address\nA,1\nB,2,extra\nC,3\n";
        let batch = parse_records(content, InputFormat::Csv, "id").unwrap();
        assert_eq!(ids(&batch), vec!["row-1", "row-3"]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].line, 3);
    }
}

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::ScoredOutputPort;
use crate::constants;

/// Output layouts; `.csv` selects CSV, anything else is written as JSONL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Jsonl,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Jsonl,
        }
    }
}

/// File-based implementation of ScoredOutputPort.
/// The file is created (or truncated) when rows are written.
pub struct FileScoredOutputAdapter {
    path: PathBuf,
    format: OutputFormat,
}

impl FileScoredOutputAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = OutputFormat::from_path(&path);
        Self { path, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn create(&self) -> anyhow::Result<BufWriter<File>> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(BufWriter::new(File::create(&self.path)?))
    }
}

#[async_trait]
impl ScoredOutputPort for FileScoredOutputAdapter {
    async fn write_rows(&self, rows: &[Map<String, Value>]) -> anyhow::Result<usize> {
        let writer = self.create()?;
        match self.format {
            OutputFormat::Csv => write_csv(writer, rows)?,
            OutputFormat::Jsonl => write_jsonl(writer, rows)?,
        }
        info!(rows = rows.len(), path = %self.path.display(), format = ?self.format, "Wrote output rows");
        Ok(rows.len())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn write_jsonl<W: Write>(mut writer: W, rows: &[Map<String, Value>]) -> anyhow::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// CSV with the sorted union of all row keys as header
fn write_csv<W: Write>(writer: W, rows: &[Map<String, Value>]) -> anyhow::Result<()> {
    let header: BTreeSet<&str> = rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect();
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&header)?;
    for row in rows {
        csv_writer.write_record(header.iter().map(|key| row.get(*key).map(cell_text).unwrap_or_default()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(constants::REASONS_SEPARATOR),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_uses_sorted_key_union_and_joins_arrays() {
        let rows = vec![
            json!({"name": "a", "reasons": ["too short", "no tags"], "confidence": 0.75})
                .as_object()
                .cloned()
                .unwrap(),
            json!({"name": "b", "extra": null, "reasons": []}).as_object().cloned().unwrap(),
        ];
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &rows).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "confidence,extra,name,reasons");
        assert_eq!(lines[1], "0.75,,a,too short; no tags");
        assert_eq!(lines[2], ",,b,");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("out.jsonl")), OutputFormat::Jsonl);
        assert_eq!(OutputFormat::from_path(Path::new("out")), OutputFormat::Jsonl);
    }
}

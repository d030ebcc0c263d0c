use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::app::ports::OverrideSourcePort;
use crate::domain::RecordId;
use crate::pipeline::review::merge::{MergeError, MergeRejection, OverrideBatch, ReviewOverride};

/// One override line of a JSONL (or JSON array) override file
#[derive(Debug, Deserialize)]
struct OverrideLine {
    record_id: RecordId,
    #[serde(flatten)]
    review: ReviewOverride,
}

/// Reads reviewer overrides from a file: a JSON object keyed by record id, a JSON array
/// of lines, or JSONL with a `record_id` per line
pub struct FileOverrideSource {
    path: PathBuf,
}

impl FileOverrideSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OverrideSourcePort for FileOverrideSource {
    async fn read_overrides(&self) -> anyhow::Result<OverrideBatch> {
        let content = fs::read_to_string(&self.path)?;
        let batch = parse_overrides(&content);
        info!(
            path = %self.path.display(),
            overrides = batch.overrides.len(),
            unparsed = batch.rejected.len(),
            "Read review overrides"
        );
        Ok(batch)
    }
}

/// Parse an override document. Entries that do not deserialize are collected as
/// rejections with their record id (when readable) and 1-based position.
pub fn parse_overrides(content: &str) -> OverrideBatch {
    // A whole-document JSON value first, JSONL otherwise
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) if !map.contains_key("record_id") => {
            let mut batch = OverrideBatch::default();
            for (position, (id, value)) in map.into_iter().enumerate() {
                let record_id = RecordId::new(id);
                match serde_json::from_value::<ReviewOverride>(value) {
                    Ok(review) => insert(&mut batch, record_id, review),
                    Err(e) => reject(&mut batch, Some(record_id), position + 1, e.to_string()),
                }
            }
            batch
        }
        Ok(Value::Array(items)) => {
            let mut batch = OverrideBatch::default();
            for (position, item) in items.into_iter().enumerate() {
                parse_line_value(&mut batch, item, position + 1);
            }
            batch
        }
        _ => parse_override_lines(content),
    }
}

fn parse_override_lines(content: &str) -> OverrideBatch {
    let mut batch = OverrideBatch::default();
    for (index, text) in content.lines().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => parse_line_value(&mut batch, value, index + 1),
            Err(e) => reject(&mut batch, None, index + 1, e.to_string()),
        }
    }
    batch
}

fn parse_line_value(batch: &mut OverrideBatch, value: Value, line: usize) {
    let record_id = value
        .get("record_id")
        .and_then(Value::as_str)
        .map(RecordId::from);
    match serde_json::from_value::<OverrideLine>(value) {
        Ok(parsed) => insert(batch, parsed.record_id, parsed.review),
        Err(e) => reject(batch, record_id, line, e.to_string()),
    }
}

fn insert(batch: &mut OverrideBatch, record_id: RecordId, review: ReviewOverride) {
    if batch.overrides.contains_key(&record_id) {
        warn!(record_id = %record_id, "Duplicate override, the last one wins");
    }
    batch.overrides.insert(record_id, review);
}

fn reject(batch: &mut OverrideBatch, record_id: Option<RecordId>, line: usize, error: String) {
    batch
        .rejected
        .push(MergeRejection::new(record_id, Some(line), &MergeError::Malformed(error)));
}

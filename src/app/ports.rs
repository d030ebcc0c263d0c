use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::RawRecord;
use crate::pipeline::review::merge::OverrideBatch;
use crate::pipeline::ReviewItem;

/// An input row that could not be turned into a record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// 1-based line (JSONL, CSV) or array position (JSON)
    pub line: usize,
    pub reason: String,
}

/// Everything a source produced for one run
#[derive(Clone, Debug, Default)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedRecord>,
}

#[async_trait]
pub trait RecordSourcePort: Send + Sync {
    async fn read_records(&self) -> anyhow::Result<SourceBatch>;
}

#[async_trait]
pub trait ScoredOutputPort: Send + Sync {
    /// Write all output rows, returning how many were written
    async fn write_rows(&self, rows: &[Map<String, Value>]) -> anyhow::Result<usize>;
    fn location(&self) -> String;
}

#[async_trait]
pub trait ReviewBatchPort: Send + Sync {
    async fn write_items(&self, items: &[ReviewItem]) -> anyhow::Result<usize>;
    fn location(&self) -> String;
}

#[async_trait]
pub trait OverrideSourcePort: Send + Sync {
    /// Entries that fail to parse come back as rejections; only I/O failures are errors
    async fn read_overrides(&self) -> anyhow::Result<OverrideBatch>;
}

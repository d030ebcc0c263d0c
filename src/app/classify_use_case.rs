use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{
    OverrideSourcePort, RecordSourcePort, ReviewBatchPort, ScoredOutputPort, SkippedRecord,
};
use crate::observability::metrics;
use crate::pipeline::review::merge::MergeReport;
use crate::pipeline::{ClassifiedBatch, Pipeline, ReviewExporter};

/// Accounting for one classification run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub total_records: usize,
    pub skipped: Vec<SkippedRecord>,
    pub decisions: BTreeMap<&'static str, usize>,
    pub duplicates: usize,
    pub rows_written: usize,
    pub output: String,
    pub exported: usize,
    pub review_batch: Option<String>,
    pub merge: Option<MergeReport>,
    pub config_fingerprint: String,
}

/// Use case for classifying a record set: read, classify, merge overrides, write
pub struct ClassifyUseCase {
    pipeline: Pipeline,
    exporter: ReviewExporter,
    source: Box<dyn RecordSourcePort>,
    output: Box<dyn ScoredOutputPort>,
    review_batch: Option<Box<dyn ReviewBatchPort>>,
    overrides: Option<Box<dyn OverrideSourcePort>>,
}

impl ClassifyUseCase {
    pub fn new(
        pipeline: Pipeline,
        exporter: ReviewExporter,
        source: Box<dyn RecordSourcePort>,
        output: Box<dyn ScoredOutputPort>,
    ) -> Self {
        Self {
            pipeline,
            exporter,
            source,
            output,
            review_batch: None,
            overrides: None,
        }
    }

    pub fn with_review_batch(mut self, review_batch: Box<dyn ReviewBatchPort>) -> Self {
        self.review_batch = Some(review_batch);
        self
    }

    pub fn with_overrides(mut self, overrides: Box<dyn OverrideSourcePort>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("classify", run_id = %run_id);
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid) -> Result<RunReport> {
        let source = self.source.read_records().await.context("Failed to read input records")?;
        metrics::input::records_read(source.records.len());
        for skipped in &source.skipped {
            warn!(line = skipped.line, reason = %skipped.reason, "Skipped malformed input row");
            metrics::input::record_skipped("malformed");
        }

        let mut batch = self.pipeline.classify(source.records);

        let merge = match &self.overrides {
            Some(port) => {
                let overrides = port.read_overrides().await.context("Failed to read review overrides")?;
                Some(batch.apply_override_batch(&overrides))
            }
            None => None,
        };

        let rows: Vec<_> = batch.records.iter().map(|r| r.output_row()).collect();
        let rows_written = self
            .output
            .write_rows(&rows)
            .await
            .with_context(|| format!("Failed to write output to {}", self.output.location()))?;

        let (exported, review_batch) = self.export_review_batch(&batch).await?;

        let report = RunReport {
            run_id,
            total_records: batch.len(),
            skipped: source.skipped,
            decisions: batch.decision_counts(),
            duplicates: batch.duplicates.duplicate_count(),
            rows_written,
            output: self.output.location(),
            exported,
            review_batch,
            merge,
            config_fingerprint: batch.config_fingerprint.clone(),
        };
        info!(
            records = report.total_records,
            skipped = report.skipped.len(),
            exported = report.exported,
            "Run finished"
        );
        Ok(report)
    }

    async fn export_review_batch(&self, batch: &ClassifiedBatch) -> Result<(usize, Option<String>)> {
        let Some(port) = &self.review_batch else {
            return Ok((0, None));
        };
        let items = self.exporter.select(batch);
        let written = port
            .write_items(&items)
            .await
            .with_context(|| format!("Failed to write review batch to {}", port.location()))?;
        metrics::review::items_exported(written);
        info!(items = written, path = %port.location(), "Exported review batch");
        Ok((written, Some(port.location())))
    }
}

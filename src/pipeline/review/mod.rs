// External review: batch export of ambiguous records and merge-back of overrides

pub mod merge;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ReviewConfig;
use crate::constants;
use crate::domain::{Decision, Field, Finding, RecordId};
use crate::pipeline::orchestrator::{ClassifiedBatch, ClassifiedRecord};
use crate::pipeline::processing::decision::DecisionProvenance;

/// One line of a review batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub version: String,
    pub record_id: RecordId,
    pub name: Field,
    pub address: Field,
    pub description: Field,
    pub tags: Option<BTreeSet<String>>,
    pub source: Field,
    pub opening_date: Option<NaiveDate>,
    pub findings: Vec<Finding>,
    pub decision: Decision,
    pub confidence: f64,
    pub quality_score: f64,
    pub config_fingerprint: String,
    pub prompt: String,
}

impl ReviewItem {
    pub fn from_record(record: &ClassifiedRecord, config_fingerprint: &str) -> Self {
        let normalized = &record.normalized;
        let scored = &record.scored;
        Self {
            version: constants::REVIEW_BATCH_VERSION.to_string(),
            record_id: scored.id.clone(),
            name: normalized.name.clone(),
            address: normalized.address.clone(),
            description: normalized.description.clone(),
            tags: normalized.tags.clone(),
            source: normalized.source.clone(),
            opening_date: normalized.opening_date,
            findings: scored.findings.clone(),
            decision: scored.decision,
            confidence: scored.confidence,
            quality_score: scored.quality_score,
            config_fingerprint: config_fingerprint.to_string(),
            prompt: constants::REVIEW_PROMPT.to_string(),
        }
    }
}

/// Selects records that need an external look
#[derive(Debug, Clone)]
pub struct ReviewExporter {
    export_threshold: f64,
}

impl ReviewExporter {
    pub fn new(export_threshold: f64) -> Self {
        Self { export_threshold }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(config.export_threshold)
    }

    /// Ambiguous decisions always go out; anything else only below the threshold
    pub fn should_export(&self, decision: Decision, confidence: f64) -> bool {
        decision.is_ambiguous() || confidence < self.export_threshold
    }

    /// Review items for the selected records, in input order.
    /// Records already decided by an external review are not sent out again.
    pub fn select(&self, batch: &ClassifiedBatch) -> Vec<ReviewItem> {
        batch
            .records
            .iter()
            .filter(|r| r.scored.provenance == DecisionProvenance::Rules)
            .filter(|r| self.should_export(r.scored.decision, r.scored.confidence))
            .map(|r| ReviewItem::from_record(r, &batch.config_fingerprint))
            .collect()
    }
}

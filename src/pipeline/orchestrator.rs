use rayon::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants;
use crate::domain::{Decision, RawRecord, RecordId};
use crate::error::{QualityError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::decision::{DecisionPolicy, ScoredRecord};
use crate::pipeline::processing::dedupe::{DuplicateIndex, Membership};
use crate::pipeline::processing::normalize::{DefaultNormalizer, NormalizedRecord, Normalizer};
use crate::pipeline::processing::quality_gate::RuleSet;
use crate::pipeline::processing::scoring::ScoreCalculator;
use crate::pipeline::review::merge::{self, MergeReport, OverrideBatch, Overrides};

/// One input record together with everything the pipeline derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub raw: RawRecord,
    pub normalized: NormalizedRecord,
    pub scored: ScoredRecord,
}

impl ClassifiedRecord {
    /// All original fields plus the classification columns
    pub fn output_row(&self) -> Map<String, Value> {
        let scored = &self.scored;
        let mut row = self.raw.fields.clone();
        row.insert(constants::OUTPUT_RECORD_ID.into(), json!(scored.id));
        row.insert(constants::OUTPUT_DECISION.into(), json!(scored.decision));
        row.insert(constants::OUTPUT_REASONS.into(), json!(scored.reasons));
        row.insert(constants::OUTPUT_CONFIDENCE.into(), json!(scored.confidence));
        row.insert(constants::OUTPUT_QUALITY_SCORE.into(), json!(scored.quality_score));
        row.insert(
            constants::OUTPUT_DECISION_SOURCE.into(),
            json!(scored.provenance.marker()),
        );
        row
    }
}

/// Result of classifying one record set
#[derive(Debug, Clone)]
pub struct ClassifiedBatch {
    pub records: Vec<ClassifiedRecord>,
    pub duplicates: DuplicateIndex,
    pub config_fingerprint: String,
}

impl ClassifiedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&ClassifiedRecord> {
        self.records.iter().find(|r| &r.scored.id == id)
    }

    /// Record count per decision; every decision is present, possibly with 0
    pub fn decision_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> =
            Decision::ALL.iter().map(|d| (d.as_str(), 0)).collect();
        for record in &self.records {
            *counts.entry(record.scored.decision.as_str()).or_default() += 1;
        }
        counts
    }

    /// Apply external review overrides onto this batch
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> MergeReport {
        merge::apply_overrides(self.records.iter_mut().map(|r| &mut r.scored), overrides)
    }

    /// Apply a parsed override file, reporting its unparsable entries as rejections
    pub fn apply_override_batch(&mut self, batch: &OverrideBatch) -> MergeReport {
        merge::apply_override_batch(self.records.iter_mut().map(|r| &mut r.scored), batch)
    }
}

/// The classification pipeline.
///
/// Phase 1 normalizes every record and builds the duplicate index; the index is frozen
/// before phase 2 starts. Phase 2 (rules, scoring, decision) runs in parallel over records
/// and only reads shared state, so results do not depend on the number of workers.
pub struct Pipeline {
    normalizer: Box<dyn Normalizer>,
    rules: RuleSet,
    scorer: ScoreCalculator,
    policy: DecisionPolicy,
    dedupe: bool,
    pool: Option<rayon::ThreadPool>,
    config_fingerprint: String,
}

impl Pipeline {
    /// Build every component from a validated config
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let pool = if config.pipeline.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.pipeline.workers)
                .build()
                .map_err(|e| QualityError::config(format!("pipeline.workers: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            normalizer: Box::new(DefaultNormalizer::new(config.fields.clone())),
            rules: RuleSet::from_config(&config.rules)?,
            scorer: ScoreCalculator::from_config(&config.scoring)?,
            policy: DecisionPolicy::from_config(&config.decision),
            dedupe: config.pipeline.dedupe,
            pool,
            config_fingerprint: config.fingerprint(),
        })
    }

    /// Replace the rule set, e.g. to add custom rules
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config_fingerprint(&self) -> &str {
        &self.config_fingerprint
    }

    /// Classify a complete record set. Output order equals input order.
    pub fn classify(&self, raw: Vec<RawRecord>) -> ClassifiedBatch {
        let total = raw.len();
        info!(records = total, rules = ?self.rules.ids(), "Classifying records");

        // Phase 1a: normalize
        let started = Instant::now();
        let normalized: Vec<NormalizedRecord> =
            self.run(|| raw.par_iter().map(|r| self.normalizer.normalize(r)).collect());
        metrics::pipeline::phase_duration("normalize", started.elapsed().as_secs_f64());

        // Phase 1b: single-writer duplicate index, frozen before any decision is made
        let started = Instant::now();
        let duplicates = DuplicateIndex::build(&normalized, self.dedupe);
        metrics::pipeline::phase_duration("dedupe", started.elapsed().as_secs_f64());
        metrics::pipeline::duplicates_detected(duplicates.duplicate_count(), duplicates.groups().len());

        // Phase 2: per-record evaluation against read-only state
        let started = Instant::now();
        let scored: Vec<ScoredRecord> = self.run(|| {
            normalized
                .par_iter()
                .enumerate()
                .map(|(position, record)| {
                    let membership = duplicates.membership(position);
                    self.assess(record, membership)
                })
                .collect()
        });
        metrics::pipeline::phase_duration("evaluate", started.elapsed().as_secs_f64());

        let records: Vec<ClassifiedRecord> = raw
            .into_iter()
            .zip(normalized)
            .zip(scored)
            .map(|((raw, normalized), scored)| ClassifiedRecord { raw, normalized, scored })
            .collect();

        record_metrics(&records);
        let batch = ClassifiedBatch {
            records,
            duplicates,
            config_fingerprint: self.config_fingerprint.clone(),
        };
        info!(
            records = batch.len(),
            duplicates = batch.duplicates.duplicate_count(),
            decisions = ?batch.decision_counts(),
            "Classification finished"
        );
        batch
    }

    /// Rules, scoring and decision for one record with finalized membership
    pub fn assess(&self, record: &NormalizedRecord, membership: Option<Membership>) -> ScoredRecord {
        let is_duplicate = membership.is_some_and(|m| m.is_duplicate);
        let findings = self.rules.evaluate(record, is_duplicate);
        let scores = self.scorer.score(&findings);
        let scored = self.policy.score_record(
            record.id.clone(),
            findings,
            scores,
            is_duplicate,
            membership.map(|m| m.group),
        );
        debug!(
            record_id = %scored.id,
            decision = %scored.decision,
            confidence = scored.confidence,
            "Record assessed"
        );
        scored
    }

    fn run<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

fn record_metrics(records: &[ClassifiedRecord]) {
    metrics::pipeline::records_classified(records.len());
    for record in records {
        let scored = &record.scored;
        metrics::quality_gate::decision_recorded(scored.decision.as_str());
        metrics::quality_gate::scores_recorded(scored.confidence, scored.quality_score);
        for finding in &scored.findings {
            metrics::quality_gate::finding_detected(&finding.rule, finding.severity.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, value: Value) -> RawRecord {
        RawRecord::new(RecordId::from(id), value.as_object().cloned().unwrap())
    }

    fn complete(id: &str, name: &str) -> RawRecord {
        raw(
            id,
            json!({
                "name": name,
                "full_address": "Mannerheimintie 1, Helsinki",
                "description": "Seasonal Nordic tasting menu with natural wines and a view.",
                "tags": "nordic, fine dining",
                "first_seen": "2025-01-04"
            }),
        )
    }

    #[test]
    fn test_output_row_keeps_original_fields() {
        let pipeline = Pipeline::from_config(&Config::default()).unwrap();
        let batch = pipeline.classify(vec![complete("r1", "Ravintola Savu")]);
        let row = batch.records[0].output_row();

        assert_eq!(row["first_seen"], json!("2025-01-04"));
        assert_eq!(row["decision"], json!("Keep"));
        assert_eq!(row["reasons"], json!([]));
        assert_eq!(row["confidence"], json!(1.0));
        assert_eq!(row["quality_score"], json!(1.0));
        assert_eq!(row["decision_source"], json!("rules"));
        assert_eq!(row["record_id"], json!("r1"));
    }

    #[test]
    fn test_one_scored_record_per_input_in_order() {
        let pipeline = Pipeline::from_config(&Config::default()).unwrap();
        let input = vec![
            complete("a", "Savu"),
            raw("b", json!({"name": "no address"})),
            complete("c", "Kuu"),
        ];
        let batch = pipeline.classify(input);
        let ids: Vec<_> = batch.records.iter().map(|r| r.scored.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let input: Vec<RawRecord> = (0..200)
            .map(|i| complete(&format!("r{}", i), &format!("Place {}", i % 37)))
            .collect();

        let serial = Config {
            pipeline: crate::config::PipelineConfig { workers: 1, dedupe: true },
            ..Config::default()
        };
        let parallel = Config {
            pipeline: crate::config::PipelineConfig { workers: 4, dedupe: true },
            ..Config::default()
        };

        let a = Pipeline::from_config(&serial).unwrap().classify(input.clone());
        let b = Pipeline::from_config(&parallel).unwrap().classify(input);
        assert_eq!(a.records, b.records);
        assert_eq!(a.duplicates.duplicate_count(), 200 - 37);
    }

    #[test]
    fn test_decision_counts_cover_all_decisions() {
        let pipeline = Pipeline::from_config(&Config::default()).unwrap();
        let batch = pipeline.classify(vec![complete("a", "Savu")]);
        let counts = batch.decision_counts();
        assert_eq!(counts.len(), 4);
        assert_eq!(counts["Keep"], 1);
        assert_eq!(counts["Remove"], 0);
    }
}

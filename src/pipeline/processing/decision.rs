use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::DecisionConfig;
use crate::constants;
use crate::domain::{Decision, Finding, RecordId};
use crate::pipeline::processing::dedupe::GroupId;
use crate::pipeline::processing::scoring::Scores;

/// Where the current decision of a record came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DecisionProvenance {
    /// Derived by the deterministic rule pipeline
    Rules,
    /// Overridden by an external reviewer
    ExternalReview {
        /// The decision the rules produced before the first override
        rule_decision: Decision,
        reviewer: Option<String>,
    },
}

impl DecisionProvenance {
    /// Short marker written to the `decision_source` output column
    pub fn marker(&self) -> &'static str {
        match self {
            DecisionProvenance::Rules => "rules",
            DecisionProvenance::ExternalReview { .. } => "external_review",
        }
    }
}

/// The pipeline's verdict on one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: RecordId,
    pub decision: Decision,
    /// Human-readable reasons, in rule evaluation order
    pub reasons: Vec<String>,
    pub findings: Vec<Finding>,
    pub confidence: f64,
    pub quality_score: f64,
    pub is_duplicate: bool,
    pub group: Option<GroupId>,
    pub provenance: DecisionProvenance,
}

/// Deterministic decision table over (findings, confidence, duplicate flag).
///
/// Evaluated top-down, first match wins:
/// 1. Remove: a duplicate flag, or any finding listed in `remove_on`
/// 2. NeedsMoreInfo: an `internal_error` finding, or the finding codes are exactly
///    `needs_info_when`
/// 3. NeedsEditing: any other finding, or confidence below `keep_threshold`
/// 4. Keep
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    keep_threshold: f64,
    remove_on: BTreeSet<String>,
    needs_info_when: BTreeSet<String>,
}

impl DecisionPolicy {
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self {
            keep_threshold: config.keep_threshold,
            remove_on: config.remove_on.iter().cloned().collect(),
            needs_info_when: config.needs_info_when.iter().cloned().collect(),
        }
    }

    pub fn keep_threshold(&self) -> f64 {
        self.keep_threshold
    }

    pub fn resolve(&self, findings: &[Finding], confidence: f64, is_duplicate: bool) -> Decision {
        if is_duplicate || findings.iter().any(|f| self.remove_on.contains(&f.rule)) {
            return Decision::Remove;
        }

        let codes: BTreeSet<String> = findings.iter().map(|f| f.rule.clone()).collect();
        if codes.contains(constants::INTERNAL_ERROR)
            || (!self.needs_info_when.is_empty() && codes == self.needs_info_when)
        {
            return Decision::NeedsMoreInfo;
        }

        if !findings.is_empty() || confidence < self.keep_threshold {
            return Decision::NeedsEditing;
        }

        Decision::Keep
    }

    /// Resolve the decision and assemble the scored record
    pub fn score_record(
        &self,
        id: RecordId,
        findings: Vec<Finding>,
        scores: Scores,
        is_duplicate: bool,
        group: Option<GroupId>,
    ) -> ScoredRecord {
        let decision = self.resolve(&findings, scores.confidence, is_duplicate);
        let reasons = findings.iter().map(|f| f.reason.clone()).collect();
        ScoredRecord {
            id,
            decision,
            reasons,
            findings,
            confidence: scores.confidence,
            quality_score: scores.quality_score,
            is_duplicate,
            group,
            provenance: DecisionProvenance::Rules,
        }
    }
}

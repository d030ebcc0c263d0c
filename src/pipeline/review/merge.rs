use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Decision, RecordId};
use crate::observability::metrics;
use crate::pipeline::processing::decision::{DecisionProvenance, ScoredRecord};

/// An external reviewer's verdict on one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOverride {
    /// Decision literal, e.g. `"Needs editing"`; variant names are accepted too
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl ReviewOverride {
    pub fn new(decision: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            reason: reason.into(),
            confidence: None,
            reviewer: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = Some(reviewer.into());
        self
    }

    /// Parse the decision and check the remaining values
    pub fn validate(&self) -> Result<Decision, MergeError> {
        let decision = self
            .decision
            .parse::<Decision>()
            .map_err(|_| MergeError::InvalidDecision(self.decision.clone()))?;
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(MergeError::ConfidenceOutOfRange(confidence));
            }
        }
        if self.reason.trim().is_empty() {
            return Err(MergeError::MissingReason);
        }
        Ok(decision)
    }
}

/// Overrides keyed by record id
pub type Overrides = BTreeMap<RecordId, ReviewOverride>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("unknown record id")]
    UnknownRecord,

    #[error("invalid decision '{0}'")]
    InvalidDecision(String),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("override has no reason")]
    MissingReason,

    #[error("malformed override: {0}")]
    Malformed(String),
}

/// An override that was not applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRejection {
    /// `None` when the entry was too broken to name its record
    pub record_id: Option<RecordId>,
    /// 1-based line or array position in the override file, when read from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub reason: String,
}

impl MergeRejection {
    pub fn new(record_id: Option<RecordId>, line: Option<usize>, error: &MergeError) -> Self {
        Self {
            record_id,
            line,
            reason: error.to_string(),
        }
    }

    /// Record id if known, otherwise the line it came from
    pub fn subject(&self) -> String {
        match (&self.record_id, self.line) {
            (Some(id), _) => id.to_string(),
            (None, Some(line)) => format!("line {}", line),
            (None, None) => "unknown entry".to_string(),
        }
    }
}

/// Overrides read from a review file, plus the entries that could not be parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideBatch {
    pub overrides: Overrides,
    pub rejected: Vec<MergeRejection>,
}

impl From<Overrides> for OverrideBatch {
    fn from(overrides: Overrides) -> Self {
        Self {
            overrides,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    /// Overrides that changed at least one record
    pub applied: usize,
    /// Valid overrides whose records already carried the override's result
    pub unchanged: usize,
    pub rejected: Vec<MergeRejection>,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.applied + self.unchanged + self.rejected.len()
    }
}

/// Merge external review overrides into scored records.
///
/// Only `decision`, `reasons`, `confidence` and `provenance` change. Every record carrying
/// an overridden id receives the override. Invalid entries are rejected one by one and
/// never abort the merge.
pub fn apply_overrides<'a>(
    records: impl IntoIterator<Item = &'a mut ScoredRecord>,
    overrides: &Overrides,
) -> MergeReport {
    let mut records: Vec<&'a mut ScoredRecord> = records.into_iter().collect();
    let mut by_id: HashMap<RecordId, Vec<usize>> = HashMap::new();
    for (position, record) in records.iter().enumerate() {
        by_id.entry(record.id.clone()).or_default().push(position);
    }

    let mut report = MergeReport::default();
    for (record_id, review) in overrides {
        let outcome = review.validate().and_then(|decision| {
            by_id
                .get(record_id)
                .map(|positions| (decision, positions))
                .ok_or(MergeError::UnknownRecord)
        });

        match outcome {
            Ok((decision, positions)) => {
                let mut changed = false;
                for &position in positions {
                    changed |= apply_one(&mut *records[position], decision, review);
                }
                if changed {
                    report.applied += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            Err(e) => {
                warn!(record_id = %record_id, stage = "merge", error = %e, "Rejected review override");
                report.rejected.push(MergeRejection::new(Some(record_id.clone()), None, &e));
            }
        }
    }

    metrics::review::overrides_merged(report.applied, report.unchanged, report.rejected.len());
    info!(
        applied = report.applied,
        unchanged = report.unchanged,
        rejected = report.rejected.len(),
        "Merged review overrides"
    );
    report
}

/// Merge a parsed override file: entries that failed to parse are reported as rejections
/// next to the ones [`apply_overrides`] rejects, and never stop the valid ones.
pub fn apply_override_batch<'a>(
    records: impl IntoIterator<Item = &'a mut ScoredRecord>,
    batch: &OverrideBatch,
) -> MergeReport {
    for rejection in &batch.rejected {
        warn!(
            entry = %rejection.subject(),
            stage = "merge",
            error = %rejection.reason,
            "Rejected review override"
        );
    }
    metrics::review::overrides_merged(0, 0, batch.rejected.len());

    let mut report = apply_overrides(records, &batch.overrides);
    let mut rejected = batch.rejected.clone();
    rejected.append(&mut report.rejected);
    report.rejected = rejected;
    report
}

/// Returns whether the record changed
fn apply_one(record: &mut ScoredRecord, decision: Decision, review: &ReviewOverride) -> bool {
    let rule_decision = match &record.provenance {
        DecisionProvenance::ExternalReview { rule_decision, .. } => *rule_decision,
        DecisionProvenance::Rules => record.decision,
    };
    let provenance = DecisionProvenance::ExternalReview {
        rule_decision,
        reviewer: review.reviewer.clone(),
    };
    let reasons = vec![format!("external review: {}", review.reason.trim())];
    let confidence = review.confidence.unwrap_or(record.confidence);

    let unchanged = record.decision == decision
        && record.reasons == reasons
        && record.confidence == confidence
        && record.provenance == provenance;
    if unchanged {
        return false;
    }

    record.decision = decision;
    record.reasons = reasons;
    record.confidence = confidence;
    record.provenance = provenance;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Finding, Severity};

    fn scored(id: &str, decision: Decision, confidence: f64) -> ScoredRecord {
        ScoredRecord {
            id: RecordId::from(id),
            decision,
            reasons: vec!["description too short (5 < 20 characters)".into()],
            findings: vec![Finding::new("short_description", Severity::Medium, "too short")],
            confidence,
            quality_score: 0.85,
            is_duplicate: false,
            group: Some(0),
            provenance: DecisionProvenance::Rules,
        }
    }

    fn overrides(entries: Vec<(&str, ReviewOverride)>) -> Overrides {
        entries.into_iter().map(|(id, o)| (RecordId::from(id), o)).collect()
    }

    #[test]
    fn test_override_replaces_decision_and_records_provenance() {
        let mut records = vec![scored("a", Decision::NeedsEditing, 0.8)];
        let ov = overrides(vec![(
            "a",
            ReviewOverride::new("Keep", "verified by phone").with_reviewer("ana"),
        )]);

        let report = apply_overrides(records.iter_mut(), &ov);

        assert_eq!(report.applied, 1);
        let record = &records[0];
        assert_eq!(record.decision, Decision::Keep);
        assert_eq!(record.reasons, vec!["external review: verified by phone"]);
        assert_eq!(record.confidence, 0.8);
        assert_eq!(record.findings.len(), 1);
        assert_eq!(
            record.provenance,
            DecisionProvenance::ExternalReview {
                rule_decision: Decision::NeedsEditing,
                reviewer: Some("ana".into())
            }
        );
    }

    #[test]
    fn test_applying_twice_is_idempotent() {
        let mut records = vec![scored("a", Decision::NeedsEditing, 0.8)];
        let ov = overrides(vec![("a", ReviewOverride::new("Remove", "closed").with_confidence(0.95))]);

        apply_overrides(records.iter_mut(), &ov);
        let after_first = records.clone();
        let second = apply_overrides(records.iter_mut(), &ov);

        assert_eq!(records, after_first);
        assert_eq!(second.applied, 0);
        assert_eq!(second.unchanged, 1);
    }

    #[test]
    fn test_rule_decision_survives_a_second_override() {
        let mut records = vec![scored("a", Decision::NeedsMoreInfo, 0.75)];
        apply_overrides(records.iter_mut(), &overrides(vec![("a", ReviewOverride::new("Keep", "ok"))]));
        apply_overrides(
            records.iter_mut(),
            &overrides(vec![("a", ReviewOverride::new("Remove", "actually closed"))]),
        );

        assert_eq!(records[0].decision, Decision::Remove);
        assert!(matches!(
            records[0].provenance,
            DecisionProvenance::ExternalReview { rule_decision: Decision::NeedsMoreInfo, .. }
        ));
    }

    #[test]
    fn test_invalid_entries_are_rejected_individually() {
        let mut records = vec![scored("a", Decision::NeedsEditing, 0.8), scored("b", Decision::Keep, 1.0)];
        let ov = overrides(vec![
            ("a", ReviewOverride::new("Maybe", "unsure")),
            ("b", ReviewOverride::new("Remove", "spam").with_confidence(1.5)),
            ("c", ReviewOverride::new("Keep", "fine")),
        ]);

        let report = apply_overrides(records.iter_mut(), &ov);

        assert_eq!(report.applied, 0);
        assert_eq!(report.rejected.len(), 3);
        assert_eq!(report.rejected[0].reason, "invalid decision 'Maybe'");
        assert_eq!(report.rejected[2].record_id, Some(RecordId::from("c")));
        assert_eq!(records[0].decision, Decision::NeedsEditing);
        assert_eq!(records[1].provenance, DecisionProvenance::Rules);
    }

    #[test]
    fn test_blank_reason_is_rejected() {
        assert_eq!(ReviewOverride::new("Keep", "  ").validate(), Err(MergeError::MissingReason));
    }

    #[test]
    fn test_shared_id_receives_override_on_every_record() {
        let mut records = vec![scored("x", Decision::NeedsEditing, 0.8), scored("x", Decision::Remove, 0.25)];
        let report = apply_overrides(
            records.iter_mut(),
            &overrides(vec![("x", ReviewOverride::new("needs_editing", "rewrite"))]),
        );
        assert_eq!(report.applied, 1);
        assert!(records.iter().all(|r| r.decision == Decision::NeedsEditing));
    }

    #[test]
    fn test_unparsed_entries_are_reported_next_to_applied_ones() {
        let mut records = vec![scored("a", Decision::NeedsEditing, 0.8)];
        let batch = OverrideBatch {
            overrides: overrides(vec![("a", ReviewOverride::new("Keep", "verified"))]),
            rejected: vec![MergeRejection::new(
                Some(RecordId::from("b")),
                Some(2),
                &MergeError::Malformed("invalid type: integer `3`, expected a string".into()),
            )],
        };

        let report = apply_override_batch(records.iter_mut(), &batch);

        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].subject(), "b");
        assert!(report.rejected[0].reason.starts_with("malformed override"));
        assert_eq!(report.total(), 2);
        assert_eq!(records[0].decision, Decision::Keep);
    }

    #[test]
    fn test_rejection_without_id_names_its_line() {
        let rejection = MergeRejection::new(None, Some(4), &MergeError::Malformed("eof".into()));
        assert_eq!(rejection.subject(), "line 4");
    }
}

//! Metrics for the quality pipeline
//!
//! Names follow Prometheus conventions and are centralized in [`MetricName`] so call
//! sites never use raw strings. Recording is a no-op until [`init`] installs a recorder.

use std::fmt;
use std::sync::OnceLock;
use tracing::info;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Input metrics
    InputRecordsRead,
    InputRecordsSkipped,

    // Pipeline metrics
    PipelineRecordsClassified,
    PipelinePhaseDuration,
    PipelineDuplicatesDetected,
    PipelineDuplicateGroups,

    // Quality Gate metrics
    QualityGateFindings,
    QualityGateDecisions,
    QualityGateConfidence,
    QualityGateQualityScore,

    // Review metrics
    ReviewItemsExported,
    ReviewOverridesApplied,
    ReviewOverridesUnchanged,
    ReviewOverridesRejected,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::InputRecordsRead => "rq_input_records_read_total",
            MetricName::InputRecordsSkipped => "rq_input_records_skipped_total",

            MetricName::PipelineRecordsClassified => "rq_pipeline_records_classified_total",
            MetricName::PipelinePhaseDuration => "rq_pipeline_phase_duration_seconds",
            MetricName::PipelineDuplicatesDetected => "rq_pipeline_duplicates_detected_total",
            MetricName::PipelineDuplicateGroups => "rq_pipeline_duplicate_groups",

            MetricName::QualityGateFindings => "rq_quality_gate_findings_total",
            MetricName::QualityGateDecisions => "rq_quality_gate_decisions_total",
            MetricName::QualityGateConfidence => "rq_quality_gate_confidence",
            MetricName::QualityGateQualityScore => "rq_quality_gate_quality_score",

            MetricName::ReviewItemsExported => "rq_review_items_exported_total",
            MetricName::ReviewOverridesApplied => "rq_review_overrides_applied_total",
            MetricName::ReviewOverridesUnchanged => "rq_review_overrides_unchanged_total",
            MetricName::ReviewOverridesRejected => "rq_review_overrides_rejected_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render all recorded metrics in the Prometheus exposition format
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub mod input {
    use super::MetricName;

    pub fn records_read(count: usize) {
        ::metrics::counter!(MetricName::InputRecordsRead.as_str()).increment(count as u64);
    }

    pub fn record_skipped(reason: &str) {
        ::metrics::counter!(MetricName::InputRecordsSkipped.as_str(), "reason" => reason.to_string())
            .increment(1);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn records_classified(count: usize) {
        ::metrics::counter!(MetricName::PipelineRecordsClassified.as_str()).increment(count as u64);
    }

    /// Duration of one pipeline phase (`normalize`, `dedupe`, `evaluate`)
    pub fn phase_duration(phase: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::PipelinePhaseDuration.as_str(), "phase" => phase).record(secs);
    }

    pub fn duplicates_detected(count: usize, groups: usize) {
        ::metrics::counter!(MetricName::PipelineDuplicatesDetected.as_str()).increment(count as u64);
        ::metrics::gauge!(MetricName::PipelineDuplicateGroups.as_str()).set(groups as f64);
    }
}

pub mod quality_gate {
    use super::MetricName;

    pub fn finding_detected(rule: &str, severity: &str) {
        ::metrics::counter!(MetricName::QualityGateFindings.as_str(),
            "rule" => rule.to_string(),
            "severity" => severity.to_string()
        )
        .increment(1);
    }

    pub fn decision_recorded(decision: &str) {
        ::metrics::counter!(MetricName::QualityGateDecisions.as_str(), "decision" => decision.to_string())
            .increment(1);
    }

    pub fn scores_recorded(confidence: f64, quality_score: f64) {
        ::metrics::histogram!(MetricName::QualityGateConfidence.as_str()).record(confidence);
        ::metrics::histogram!(MetricName::QualityGateQualityScore.as_str()).record(quality_score);
    }
}

pub mod review {
    use super::MetricName;

    pub fn items_exported(count: usize) {
        ::metrics::counter!(MetricName::ReviewItemsExported.as_str()).increment(count as u64);
    }

    pub fn overrides_merged(applied: usize, unchanged: usize, rejected: usize) {
        ::metrics::counter!(MetricName::ReviewOverridesApplied.as_str()).increment(applied as u64);
        ::metrics::counter!(MetricName::ReviewOverridesUnchanged.as_str()).increment(unchanged as u64);
        ::metrics::counter!(MetricName::ReviewOverridesRejected.as_str()).increment(rejected as u64);
    }
}

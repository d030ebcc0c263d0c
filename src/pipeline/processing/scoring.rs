use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::domain::{Finding, Severity};
use crate::error::{QualityError, Result};

/// Confidence and quality score of one record, both within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub confidence: f64,
    pub quality_score: f64,
}

/// Derives scores from findings using the configured weight tables.
///
/// Both scores start at 1.0 and lose one weight per finding, clamped at 0. Confidence
/// weights come from a per-rule override when one is configured, otherwise from the
/// finding's severity. Quality weights are keyed by rule only; rules without an entry
/// do not affect quality.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    severity_weights: [f64; 3],
    rule_confidence_weights: BTreeMap<String, f64>,
    quality_weights: BTreeMap<String, f64>,
}

impl ScoreCalculator {
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        let defaults = ScoringConfig::default().confidence.severity;
        let mut severity_weights = [0.0; 3];
        for severity in [Severity::Low, Severity::Medium, Severity::High] {
            let weight = config
                .confidence
                .severity
                .get(severity.as_str())
                .or_else(|| defaults.get(severity.as_str()))
                .copied()
                .unwrap_or(0.0);
            severity_weights[severity_slot(severity)] = weight;
        }

        let calculator = Self {
            severity_weights,
            rule_confidence_weights: config.confidence.rules.clone(),
            quality_weights: config.quality.clone(),
        };
        calculator.check()?;
        Ok(calculator)
    }

    fn check(&self) -> Result<()> {
        let all = self
            .severity_weights
            .iter()
            .chain(self.rule_confidence_weights.values())
            .chain(self.quality_weights.values());
        for weight in all {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(QualityError::config(format!("invalid scoring weight {}", weight)));
            }
        }
        Ok(())
    }

    /// Confidence deduction of a single finding
    pub fn confidence_weight(&self, finding: &Finding) -> f64 {
        self.rule_confidence_weights
            .get(&finding.rule)
            .copied()
            .unwrap_or(self.severity_weights[severity_slot(finding.severity)])
    }

    /// Quality deduction of a single finding
    pub fn quality_weight(&self, finding: &Finding) -> f64 {
        self.quality_weights.get(&finding.rule).copied().unwrap_or(0.0)
    }

    pub fn score(&self, findings: &[Finding]) -> Scores {
        let confidence_loss: f64 = findings.iter().map(|f| self.confidence_weight(f)).sum();
        let quality_loss: f64 = findings.iter().map(|f| self.quality_weight(f)).sum();
        Scores {
            confidence: clamp_unit(1.0 - confidence_loss),
            quality_score: clamp_unit(1.0 - quality_loss),
        }
    }
}

fn severity_slot(severity: Severity) -> usize {
    match severity {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
    }
}

/// Clamp to [0, 1] and round to 4 decimals so repeated runs print identical values
fn clamp_unit(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    rounded.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants;

    fn finding(rule: &str, severity: Severity) -> Finding {
        Finding::new(rule, severity, "test")
    }

    fn calculator() -> ScoreCalculator {
        ScoreCalculator::from_config(&ScoringConfig::default()).unwrap()
    }

    #[test]
    fn test_no_findings_scores_perfect() {
        let scores = calculator().score(&[]);
        assert_eq!(scores.confidence, 1.0);
        assert_eq!(scores.quality_score, 1.0);
    }

    #[test]
    fn test_severity_weights_apply_without_override() {
        let scores = calculator().score(&[finding(constants::SHORT_DESCRIPTION, Severity::Medium)]);
        assert_eq!(scores.confidence, 0.8);
        assert_eq!(scores.quality_score, 0.85);

        let scores = calculator().score(&[
            finding(constants::SHORT_DESCRIPTION, Severity::Medium),
            finding(constants::MISSING_TAGS, Severity::Low),
        ]);
        assert_eq!(scores.confidence, 0.75);
        assert_eq!(scores.quality_score, 0.75);
    }

    #[test]
    fn test_rule_override_beats_severity() {
        let scores = calculator().score(&[finding(constants::MISSING_FIELD, Severity::High)]);
        assert_eq!(scores.confidence, 0.25);
        assert!(scores.confidence <= 0.3);
    }

    #[test]
    fn test_scores_clamp_at_zero() {
        let findings: Vec<_> = (0..5).map(|_| finding(constants::MISSING_FIELD, Severity::High)).collect();
        let scores = calculator().score(&findings);
        assert_eq!(scores.confidence, 0.0);
        assert_eq!(scores.quality_score, 0.0);
    }

    #[test]
    fn test_adding_high_severity_never_raises_confidence() {
        let calc = calculator();
        let bases = vec![
            vec![],
            vec![finding(constants::MISSING_TAGS, Severity::Low)],
            vec![finding(constants::CHAIN_EXCLUSION, Severity::Medium)],
            vec![finding(constants::MISSING_FIELD, Severity::High); 3],
        ];
        for base in bases {
            let before = calc.score(&base).confidence;
            for extra in [
                finding(constants::DUPLICATE, Severity::High),
                finding(constants::INTERNAL_ERROR, Severity::High),
                finding("custom", Severity::High),
            ] {
                let mut more = base.clone();
                more.push(extra);
                assert!(calc.score(&more).confidence <= before);
            }
        }
    }

    #[test]
    fn test_partial_severity_table_falls_back_to_defaults() {
        let mut config = ScoringConfig::default();
        config.confidence.severity = [("medium".to_string(), 0.5)].into_iter().collect();
        let calc = ScoreCalculator::from_config(&config).unwrap();

        assert_eq!(calc.score(&[finding("x", Severity::Medium)]).confidence, 0.5);
        assert_eq!(calc.score(&[finding("x", Severity::High)]).confidence, 0.6);
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let mut config = ScoringConfig::default();
        config.quality.insert(constants::MISSING_TAGS.to_string(), -0.1);
        assert!(ScoreCalculator::from_config(&config).is_err());
    }
}

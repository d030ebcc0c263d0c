pub mod rules;

use tracing::warn;

use crate::config::RulesConfig;
use crate::constants;
use crate::domain::{Finding, Severity};
use crate::error::Result;
use crate::pipeline::processing::normalize::NormalizedRecord;

pub use rules::{
    BlocklistRule, ChainExclusionRule, DuplicateRule, MissingFieldRule, MissingTagsRule,
    ShortDescriptionRule,
};

/// A single, independent quality check.
///
/// Rules are pure: they see the normalized record and its precomputed duplicate flag,
/// never each other's output.
pub trait QualityRule: Send + Sync {
    /// Finding code this rule emits
    fn id(&self) -> &'static str;

    /// Evaluate the record, returning zero or more findings
    fn evaluate(&self, record: &NormalizedRecord, is_duplicate: bool) -> anyhow::Result<Vec<Finding>>;
}

/// Ordered collection of rules. Evaluation order is the insertion order, which makes
/// reason lists reproducible.
pub struct RuleSet {
    rules: Vec<Box<dyn QualityRule>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build the built-in rules in their documented order, leaving out disabled ones:
    /// missing_field, short_description, missing_tags, duplicate, blocklisted_content,
    /// chain_exclusion
    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        let candidates: Vec<Box<dyn QualityRule>> = vec![
            Box::new(MissingFieldRule::new(config.required_fields.clone())),
            Box::new(ShortDescriptionRule::new(config.min_description_length)),
            Box::new(MissingTagsRule::new(config.min_tags_count)),
            Box::new(DuplicateRule),
            Box::new(BlocklistRule::new(&config.blocklist, config.term_matching)?),
            Box::new(ChainExclusionRule::new(
                &config.chains,
                &config.chain_patterns,
                config.term_matching,
            )?),
        ];

        let rules = candidates
            .into_iter()
            .filter(|rule| !config.disabled.iter().any(|d| d == rule.id()))
            .collect();

        Ok(Self { rules })
    }

    /// Append a rule; it runs after every rule already in the set
    pub fn push(&mut self, rule: Box<dyn QualityRule>) {
        self.rules.push(rule);
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule in order. A failing rule does not stop evaluation: it is recorded
    /// as an `internal_error` finding on this record.
    pub fn evaluate(&self, record: &NormalizedRecord, is_duplicate: bool) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in &self.rules {
            match rule.evaluate(record, is_duplicate) {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    warn!(
                        record_id = %record.id,
                        rule = rule.id(),
                        stage = "rule_evaluation",
                        "Rule failed: {:#}",
                        e
                    );
                    findings.push(Finding::new(
                        constants::INTERNAL_ERROR,
                        Severity::High,
                        format!("rule '{}' failed: {}", rule.id(), e),
                    ));
                }
            }
        }
        findings
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.ids()).finish()
    }
}

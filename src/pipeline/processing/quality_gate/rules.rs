use anyhow::anyhow;
use regex::Regex;

use super::QualityRule;
use crate::config::TermMatching;
use crate::constants;
use crate::domain::{Finding, Severity};
use crate::error::{QualityError, Result};
use crate::pipeline::processing::normalize::{normalize_text, NormalizedRecord};

/// Required canonical fields must be present and non-blank.
/// Emits one finding per missing field.
pub struct MissingFieldRule {
    required: Vec<String>,
}

impl MissingFieldRule {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

impl QualityRule for MissingFieldRule {
    fn id(&self) -> &'static str {
        constants::MISSING_FIELD
    }

    fn evaluate(&self, record: &NormalizedRecord, _is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for name in &self.required {
            let field = record
                .field(name)
                .ok_or_else(|| anyhow!("unknown required field '{}'", name))?;
            if field.is_blank() {
                findings.push(Finding::new(
                    constants::MISSING_FIELD,
                    Severity::High,
                    format!("missing required field: {}", name),
                ));
            }
        }
        Ok(findings)
    }
}

/// Descriptions shorter than the configured minimum. Absent descriptions are left to
/// [`MissingFieldRule`].
pub struct ShortDescriptionRule {
    min_length: usize,
}

impl ShortDescriptionRule {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl QualityRule for ShortDescriptionRule {
    fn id(&self) -> &'static str {
        constants::SHORT_DESCRIPTION
    }

    fn evaluate(&self, record: &NormalizedRecord, _is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        let Some(description) = record.description.value() else {
            return Ok(Vec::new());
        };
        let length = description.chars().count();
        if length < self.min_length {
            return Ok(vec![Finding::new(
                constants::SHORT_DESCRIPTION,
                Severity::Medium,
                format!("description too short ({} < {} characters)", length, self.min_length),
            )]);
        }
        Ok(Vec::new())
    }
}

pub struct MissingTagsRule {
    min_count: usize,
}

impl MissingTagsRule {
    pub fn new(min_count: usize) -> Self {
        Self { min_count }
    }
}

impl QualityRule for MissingTagsRule {
    fn id(&self) -> &'static str {
        constants::MISSING_TAGS
    }

    fn evaluate(&self, record: &NormalizedRecord, _is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        let count = record.tag_count();
        if count >= self.min_count {
            return Ok(Vec::new());
        }
        let reason = if count == 0 {
            "no tags present".to_string()
        } else {
            format!("too few tags ({} < {})", count, self.min_count)
        };
        Ok(vec![Finding::new(constants::MISSING_TAGS, Severity::Low, reason)])
    }
}

/// Surfaces the precomputed duplicate flag as a finding
pub struct DuplicateRule;

impl QualityRule for DuplicateRule {
    fn id(&self) -> &'static str {
        constants::DUPLICATE
    }

    fn evaluate(&self, _record: &NormalizedRecord, is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        if !is_duplicate {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            constants::DUPLICATE,
            Severity::High,
            "duplicate of an earlier record with the same name and address",
        )])
    }
}

/// Disallowed terms (profanity and the like) in the name or description
pub struct BlocklistRule {
    matcher: Option<Regex>,
}

impl BlocklistRule {
    pub fn new(terms: &[String], matching: TermMatching) -> Result<Self> {
        Ok(Self {
            matcher: term_matcher(terms, matching)?,
        })
    }
}

impl QualityRule for BlocklistRule {
    fn id(&self) -> &'static str {
        constants::BLOCKLISTED_CONTENT
    }

    fn evaluate(&self, record: &NormalizedRecord, _is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        let Some(matcher) = &self.matcher else {
            return Ok(Vec::new());
        };
        for (label, field) in [("name", &record.name), ("description", &record.description)] {
            if let Some(found) = field.value().and_then(|text| matcher.find(text)) {
                return Ok(vec![Finding::new(
                    constants::BLOCKLISTED_CONTENT,
                    Severity::High,
                    format!("blocklisted term '{}' in {}", found.as_str(), label),
                )]);
            }
        }
        Ok(Vec::new())
    }
}

/// Large-chain names and patterns matched against the record name
pub struct ChainExclusionRule {
    names: Option<Regex>,
    patterns: Vec<Regex>,
}

impl ChainExclusionRule {
    pub fn new(chains: &[String], patterns: &[String], matching: TermMatching) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| QualityError::Regex {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            names: term_matcher(chains, matching)?,
            patterns,
        })
    }
}

impl QualityRule for ChainExclusionRule {
    fn id(&self) -> &'static str {
        constants::CHAIN_EXCLUSION
    }

    fn evaluate(&self, record: &NormalizedRecord, _is_duplicate: bool) -> anyhow::Result<Vec<Finding>> {
        let Some(name) = record.name.value() else {
            return Ok(Vec::new());
        };

        let matched = self
            .names
            .as_ref()
            .and_then(|re| re.find(name))
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                self.patterns
                    .iter()
                    .find(|re| re.is_match(name))
                    .map(|re| re.as_str().to_string())
            });

        Ok(matched
            .map(|chain| {
                vec![Finding::new(
                    constants::CHAIN_EXCLUSION,
                    Severity::Medium,
                    format!("name matches large chain '{}'", chain),
                )]
            })
            .unwrap_or_default())
    }
}

/// One case-insensitive alternation of the terms, or `None` for an empty list
fn term_matcher(terms: &[String], matching: TermMatching) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| normalize_text(t))
        .filter(|t| !t.is_empty())
        .map(|t| regex::escape(&t))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = match matching {
        TermMatching::WholeWord => format!(r"(?i)\b(?:{})\b", alternatives.join("|")),
        TermMatching::Substring => format!(r"(?i)(?:{})", alternatives.join("|")),
    };
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| QualityError::Regex { pattern, source })
}

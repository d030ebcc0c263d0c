use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::constants;
use crate::domain::Severity;
use crate::error::{QualityError, Result};

/// Complete configuration snapshot for a run.
///
/// Every section has defaults, so an empty file (or no file at all) is a valid config.
/// Configuration is validated once at startup; any error there is fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fields: FieldsConfig,
    pub rules: RulesConfig,
    pub scoring: ScoringConfig,
    pub decision: DecisionConfig,
    pub review: ReviewConfig,
    pub pipeline: PipelineConfig,
}

/// Source field aliases used by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Field carrying the record identifier, if the upstream collector provides one
    pub id_field: String,
    pub name: Vec<String>,
    pub address: Vec<String>,
    pub description: Vec<String>,
    pub tags: Vec<String>,
    pub source: Vec<String>,
    pub opening_date: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            name: to_strings(constants::NAME_ALIASES),
            address: to_strings(constants::ADDRESS_ALIASES),
            description: to_strings(constants::DESCRIPTION_ALIASES),
            tags: to_strings(constants::TAGS_ALIASES),
            source: to_strings(constants::SOURCE_ALIASES),
            opening_date: to_strings(constants::OPENING_DATE_ALIASES),
        }
    }
}

/// Parameters of the built-in rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Canonical fields that must be present: name, address, description, source
    pub required_fields: Vec<String>,
    pub min_description_length: usize,
    pub min_tags_count: usize,
    /// Disallowed terms matched in name and description
    pub blocklist: Vec<String>,
    /// Large-chain names matched in the name
    pub chains: Vec<String>,
    /// How blocklist and chain terms match the normalized text
    pub term_matching: TermMatching,
    /// Additional chain regexes matched against the normalized name
    pub chain_patterns: Vec<String>,
    /// Finding codes of rules to leave out of the rule set
    pub disabled: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            required_fields: vec!["name".into(), "address".into(), "description".into()],
            min_description_length: 40,
            min_tags_count: 1,
            blocklist: to_strings(constants::DEFAULT_BLOCKLIST),
            chains: to_strings(constants::DEFAULT_CHAIN_NAMES),
            term_matching: TermMatching::default(),
            chain_patterns: Vec::new(),
            disabled: Vec::new(),
        }
    }
}

/// Matching mode for blocklist and chain terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMatching {
    /// Term must start and end on word boundaries: "shit" does not match "shitake"
    #[default]
    WholeWord,
    /// Term may appear anywhere: "fuck" matches "fucking"
    Substring,
}

/// Weight tables for confidence and quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub confidence: ConfidenceWeights,
    /// Per finding code deduction from the quality score
    pub quality: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let quality = [
            (constants::MISSING_FIELD, 0.25),
            (constants::SHORT_DESCRIPTION, 0.15),
            (constants::MISSING_TAGS, 0.10),
            (constants::DUPLICATE, 0.05),
            (constants::BLOCKLISTED_CONTENT, 0.05),
            (constants::CHAIN_EXCLUSION, 0.0),
            (constants::INTERNAL_ERROR, 0.0),
        ];
        Self {
            confidence: ConfidenceWeights::default(),
            quality: quality.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Deduction per finding keyed by severity name (low, medium, high)
    pub severity: BTreeMap<String, f64>,
    /// Per finding code overrides of the severity weight
    pub rules: BTreeMap<String, f64>,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        let severity = [("high", 0.4), ("medium", 0.2), ("low", 0.05)];
        let rules = [
            (constants::MISSING_FIELD, 0.75),
            (constants::BLOCKLISTED_CONTENT, 0.75),
            (constants::DUPLICATE, 0.75),
        ];
        Self {
            severity: severity.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            rules: rules.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

/// Decision table parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Records below this confidence are never kept
    pub keep_threshold: f64,
    /// Any of these finding codes forces Remove
    pub remove_on: Vec<String>,
    /// Exactly this set of finding codes means the record lacks signal
    pub needs_info_when: Vec<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            keep_threshold: 0.9,
            remove_on: vec![
                constants::MISSING_FIELD.into(),
                constants::BLOCKLISTED_CONTENT.into(),
                constants::DUPLICATE.into(),
            ],
            needs_info_when: vec![constants::MISSING_TAGS.into(), constants::SHORT_DESCRIPTION.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Records below this confidence are exported for review regardless of decision
    pub export_threshold: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { export_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for rule evaluation; 0 uses one per core
    pub workers: usize,
    pub dedupe: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 0, dedupe: true }
    }
}

const REQUIRED_FIELD_NAMES: &[&str] = &["name", "address", "description", "source"];

/// Finding codes that always force Remove; `decision.remove_on` may only add to them
pub const MANDATORY_REMOVE_CODES: &[&str] = &[
    constants::MISSING_FIELD,
    constants::BLOCKLISTED_CONTENT,
    constants::DUPLICATE,
];

impl Config {
    /// Load and validate a config file; `.toml` and `.json` are supported
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            QualityError::config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let config = match extension.as_str() {
            "toml" => Self::from_toml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            other => return Err(QualityError::UnsupportedFormat(other.to_string())),
        };

        info!(path = %path.display(), fingerprint = %config.fingerprint(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the config from an explicit path, the `REC_QUALITY_CONFIG` environment
    /// variable, or defaults, in that order
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var(constants::CONFIG_ENV_VAR) {
            Ok(env_path) if !env_path.trim().is_empty() => Self::load(Path::new(env_path.trim())),
            _ => {
                debug!("No config file given, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        let known = constants::known_finding_codes();
        let check_code = |section: &str, code: &str| -> Result<()> {
            if known.contains(&code) {
                Ok(())
            } else {
                Err(QualityError::config(format!("{}: unknown finding code '{}'", section, code)))
            }
        };

        if self.fields.id_field.trim().is_empty() {
            return Err(QualityError::config("fields.id_field must not be empty"));
        }
        for (section, aliases) in [
            ("fields.name", &self.fields.name),
            ("fields.address", &self.fields.address),
            ("fields.description", &self.fields.description),
            ("fields.tags", &self.fields.tags),
        ] {
            if aliases.is_empty() {
                return Err(QualityError::config(format!("{} needs at least one alias", section)));
            }
        }

        for field in &self.rules.required_fields {
            if !REQUIRED_FIELD_NAMES.contains(&field.as_str()) {
                return Err(QualityError::config(format!(
                    "rules.required_fields: unknown field '{}' (expected one of {})",
                    field,
                    REQUIRED_FIELD_NAMES.join(", ")
                )));
            }
        }
        for pattern in &self.rules.chain_patterns {
            regex::Regex::new(pattern).map_err(|source| QualityError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
        }
        for code in &self.rules.disabled {
            check_code("rules.disabled", code)?;
            if code == constants::DUPLICATE {
                return Err(QualityError::config(
                    "rules.disabled: the duplicate rule cannot be disabled; set pipeline.dedupe = false instead",
                ));
            }
        }

        for (name, weight) in &self.scoring.confidence.severity {
            name.parse::<Severity>()
                .map_err(|e| QualityError::config(format!("scoring.confidence.severity: {}", e)))?;
            check_weight("scoring.confidence.severity", name, *weight)?;
        }
        for (code, weight) in &self.scoring.confidence.rules {
            check_code("scoring.confidence.rules", code)?;
            check_weight("scoring.confidence.rules", code, *weight)?;
        }
        for (code, weight) in &self.scoring.quality {
            check_code("scoring.quality", code)?;
            check_weight("scoring.quality", code, *weight)?;
        }

        check_unit("decision.keep_threshold", self.decision.keep_threshold)?;
        for code in self.decision.remove_on.iter() {
            check_code("decision.remove_on", code)?;
        }
        for code in MANDATORY_REMOVE_CODES {
            if !self.decision.remove_on.iter().any(|c| c == code) {
                return Err(QualityError::config(format!(
                    "decision.remove_on must include '{}' ({} always force Remove)",
                    code,
                    MANDATORY_REMOVE_CODES.join(", ")
                )));
            }
        }
        for code in self.decision.needs_info_when.iter() {
            check_code("decision.needs_info_when", code)?;
        }
        check_unit("review.export_threshold", self.review.export_threshold)?;

        Ok(())
    }

    /// Hex SHA-256 over the canonical JSON of this config.
    /// Identical configs always produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        // Maps are BTreeMaps and structs serialize in declaration order
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

fn check_weight(section: &str, key: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 || weight > 1.0 {
        return Err(QualityError::config(format!(
            "{}.{}: weight {} must be within [0, 1]",
            section, key, weight
        )));
    }
    Ok(())
}

fn check_unit(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(QualityError::config(format!("{}: {} must be within [0, 1]", key, value)));
    }
    Ok(())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_given_keys() {
        let config = Config::from_toml_str(
            r#"
            [rules]
            min_description_length = 20

            [review]
            export_threshold = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.min_description_length, 20);
        assert_eq!(config.rules.min_tags_count, 1);
        assert_eq!(config.review.export_threshold, 0.6);
        assert_eq!(config.decision.keep_threshold, 0.9);
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let err = Config::from_toml_str(
            r#"
            [scoring.confidence.severity]
            high = -0.4
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, QualityError::Config(_)));
        assert!(err.to_string().contains("high"));
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        let err = Config::from_toml_str(
            r#"
            [scoring.confidence.severity]
            critical = 0.9
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown severity"));
    }

    #[test]
    fn test_unknown_finding_code_is_rejected() {
        let err = Config::from_json_str(r#"{"decision": {"remove_on": ["spam"]}}"#).unwrap_err();
        assert!(err.to_string().contains("spam"));
    }

    #[test]
    fn test_remove_on_must_keep_mandatory_codes() {
        let err = Config::from_json_str(r#"{"decision": {"remove_on": ["missing_field"]}}"#).unwrap_err();
        assert!(matches!(err, QualityError::Config(_)));
        assert!(err.to_string().contains("blocklisted_content"));

        let widened = Config::from_toml_str(
            r#"
            [decision]
            remove_on = ["missing_field", "blocklisted_content", "duplicate", "chain_exclusion"]
            "#,
        )
        .unwrap();
        assert_eq!(widened.decision.remove_on.len(), 4);
    }

    #[test]
    fn test_duplicate_rule_cannot_be_disabled() {
        let err = Config::from_toml_str(
            r#"
            [rules]
            disabled = ["duplicate"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pipeline.dedupe"));
    }

    #[test]
    fn test_term_matching_parses_snake_case() {
        let config = Config::from_toml_str(
            r#"
            [rules]
            term_matching = "substring"
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.term_matching, TermMatching::Substring);
        assert_eq!(Config::default().rules.term_matching, TermMatching::WholeWord);
    }

    #[test]
    fn test_bad_chain_pattern_is_rejected() {
        let err = Config::from_toml_str(
            r#"
            [rules]
            chain_patterns = ["(unclosed"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, QualityError::Regex { .. }));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.rules.min_description_length = 10;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[pipeline]\nworkers = 2\ndedupe = false").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.pipeline.workers, 2);
        assert!(!config.pipeline.dedupe);

        let yaml = dir.path().join("quality.yaml");
        fs::write(&yaml, "").unwrap();
        assert!(matches!(Config::load(&yaml), Err(QualityError::UnsupportedFormat(_))));
    }
}

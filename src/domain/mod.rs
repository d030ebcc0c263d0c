use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a record within one run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Positional identifier for records that carry no id of their own
    pub fn from_position(position: usize) -> Self {
        Self(format!("row-{}", position))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A record exactly as produced by an upstream collector.
/// Field order is preserved so output rows keep the input layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(id: RecordId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A canonical text field. `Absent` means "not provided"; `Present("")` means provided
/// but empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    #[default]
    Absent,
    Present(String),
}

impl Field {
    /// The field value when it is present and not blank
    pub fn value(&self) -> Option<&str> {
        match self {
            Field::Present(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// True when the field is absent or carries only whitespace
    pub fn is_blank(&self) -> bool {
        self.value().is_none()
    }
}

/// Severity of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A single rule violation attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Machine-readable code of the rule that produced this finding
    pub rule: String,
    pub severity: Severity,
    /// Human-readable description, surfaced in the `reasons` output column
    pub reason: String,
}

impl Finding {
    pub fn new(rule: impl Into<String>, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            reason: reason.into(),
        }
    }
}

/// Final disposition of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "Keep")]
    Keep,
    #[serde(rename = "Remove")]
    Remove,
    #[serde(rename = "Needs more information")]
    NeedsMoreInfo,
    #[serde(rename = "Needs editing")]
    NeedsEditing,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::Keep,
        Decision::Remove,
        Decision::NeedsMoreInfo,
        Decision::NeedsEditing,
    ];

    /// The literal string written to output rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Keep => "Keep",
            Decision::Remove => "Remove",
            Decision::NeedsMoreInfo => "Needs more information",
            Decision::NeedsEditing => "Needs editing",
        }
    }

    /// Whether this decision calls for a human (or model) look
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Decision::NeedsMoreInfo | Decision::NeedsEditing)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    /// Accepts the output literals as well as the variant names, ignoring case,
    /// spaces and underscores
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "keep" => Ok(Decision::Keep),
            "remove" => Ok(Decision::Remove),
            "needsmoreinformation" | "needsmoreinfo" => Ok(Decision::NeedsMoreInfo),
            "needsediting" | "needsedit" => Ok(Decision::NeedsEditing),
            _ => Err(format!("invalid decision '{}'", s)),
        }
    }
}

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::config::FieldsConfig;
use crate::domain::{Field, RawRecord, RecordId};

/// A record projected into the canonical shape the rules work on.
/// Text fields are trimmed, case-folded and whitespace-collapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: RecordId,
    pub name: Field,
    pub address: Field,
    pub description: Field,
    pub source: Field,
    /// `None` when no tag field was provided at all
    pub tags: Option<BTreeSet<String>>,
    pub opening_date: Option<NaiveDate>,
}

impl NormalizedRecord {
    /// `name|address`, only formed when both parts are present and non-empty
    pub fn identity_key(&self) -> Option<String> {
        match (self.name.value(), self.address.value()) {
            (Some(name), Some(address)) => Some(format!("{}|{}", name, address)),
            _ => None,
        }
    }

    pub fn tag_count(&self) -> usize {
        self.tags.as_ref().map_or(0, |t| t.len())
    }

    /// Look up a canonical text field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        match name {
            "name" => Some(&self.name),
            "address" => Some(&self.address),
            "description" => Some(&self.description),
            "source" => Some(&self.source),
            _ => None,
        }
    }
}

/// Trait for projecting raw collector records into the canonical shape.
/// Normalization never fails: anything unusable becomes `Field::Absent`.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, record: &RawRecord) -> NormalizedRecord;
}

/// Normalizer resolving canonical fields through configurable alias lists
pub struct DefaultNormalizer {
    fields: FieldsConfig,
}

static TAG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;|]").expect("static regex"));
static PARTIAL_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:[-/.](\d{1,2}))?$").expect("static regex"));

const FULL_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

impl DefaultNormalizer {
    pub fn new(fields: FieldsConfig) -> Self {
        Self { fields }
    }

    /// First alias carrying non-blank text wins; a provided-but-blank value is kept as
    /// `Present("")` so it stays distinguishable from a missing field
    fn extract_text(&self, data: &Map<String, Value>, aliases: &[String]) -> Field {
        let mut provided_blank = false;
        for alias in aliases {
            if let Some(text) = data.get(alias).and_then(scalar_text) {
                let normalized = normalize_text(&text);
                if !normalized.is_empty() {
                    return Field::Present(normalized);
                }
                provided_blank = true;
            }
        }
        if provided_blank {
            Field::Present(String::new())
        } else {
            Field::Absent
        }
    }

    fn extract_tags(&self, data: &Map<String, Value>) -> Option<BTreeSet<String>> {
        let mut provided = None;
        for alias in &self.fields.tags {
            let Some(value) = data.get(alias) else { continue };
            let tags = parse_tags(value);
            match tags {
                Some(tags) if !tags.is_empty() => return Some(tags),
                Some(empty) => provided = Some(empty),
                None => {}
            }
        }
        provided
    }

    fn extract_opening_date(&self, data: &Map<String, Value>) -> Option<NaiveDate> {
        self.fields
            .opening_date
            .iter()
            .filter_map(|alias| data.get(alias).and_then(scalar_text))
            .find_map(|text| parse_opening_date(&text))
    }
}

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, record: &RawRecord) -> NormalizedRecord {
        let data = &record.fields;
        NormalizedRecord {
            id: record.id.clone(),
            name: self.extract_text(data, &self.fields.name),
            address: self.extract_text(data, &self.fields.address),
            description: self.extract_text(data, &self.fields.description),
            source: self.extract_text(data, &self.fields.source),
            tags: self.extract_tags(data),
            opening_date: self.extract_opening_date(data),
        }
    }
}

/// Trim, lowercase and collapse internal whitespace. Idempotent.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve the identifier of a raw row: the id field when it holds a non-blank scalar,
/// otherwise the row's 1-based position in the input
pub fn record_id_for(fields: &Map<String, Value>, id_field: &str, position: usize) -> RecordId {
    fields
        .get(id_field)
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(RecordId)
        .unwrap_or_else(|| RecordId::from_position(position))
}

/// Parse the date formats upstream collectors emit. Time suffixes are ignored, ranges
/// (`start/end`) take the start, and year or year-month values map to the first day.
pub fn parse_opening_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let head = raw.split(['T', ' ']).next().unwrap_or(raw);

    parse_date_part(head).or_else(|| {
        head.split_once('/')
            .and_then(|(start, _)| parse_date_part(start.trim()))
    })
}

fn parse_date_part(value: &str) -> Option<NaiveDate> {
    for format in FULL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    let captures = PARTIAL_DATE.captures(value)?;
    let year: i32 = captures.get(1)?.as_str().parse().ok()?;
    let month: u32 = match captures.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Text of a scalar JSON value; `null`, arrays and objects have none
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_tags(value: &Value) -> Option<BTreeSet<String>> {
    let pieces: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => TAG_SEPARATORS.split(s).map(str::to_string).collect(),
        Value::Number(_) | Value::Bool(_) => scalar_text(value).into_iter().collect(),
        Value::Null | Value::Object(_) => return None,
    };
    Some(
        pieces
            .iter()
            .map(|p| normalize_text(p))
            .filter(|t| !t.is_empty())
            .collect(),
    )
}

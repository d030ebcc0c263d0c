/// Finding codes emitted by the built-in rules.
/// These are the stable, machine-readable identifiers carried in findings, weight tables
/// and the review batch.
pub const MISSING_FIELD: &str = "missing_field";
pub const SHORT_DESCRIPTION: &str = "short_description";
pub const MISSING_TAGS: &str = "missing_tags";
pub const DUPLICATE: &str = "duplicate";
pub const BLOCKLISTED_CONTENT: &str = "blocklisted_content";
pub const CHAIN_EXCLUSION: &str = "chain_exclusion";
pub const INTERNAL_ERROR: &str = "internal_error";

/// Get all finding codes the built-in rule set can produce
pub fn known_finding_codes() -> Vec<&'static str> {
    vec![
        MISSING_FIELD,
        SHORT_DESCRIPTION,
        MISSING_TAGS,
        DUPLICATE,
        BLOCKLISTED_CONTENT,
        CHAIN_EXCLUSION,
        INTERNAL_ERROR,
    ]
}

// Field names added to every output row
pub const OUTPUT_RECORD_ID: &str = "record_id";
pub const OUTPUT_DECISION: &str = "decision";
pub const OUTPUT_REASONS: &str = "reasons";
pub const OUTPUT_CONFIDENCE: &str = "confidence";
pub const OUTPUT_QUALITY_SCORE: &str = "quality_score";
pub const OUTPUT_DECISION_SOURCE: &str = "decision_source";

/// Separator used when reasons are flattened into a single CSV cell
pub const REASONS_SEPARATOR: &str = "; ";

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "REC_QUALITY_CONFIG";

/// Instructions handed to the external reviewer with every exported record
pub const REVIEW_PROMPT: &str = "Classify this recommendation into one of: Keep, Remove, \
Needs more information, Needs editing. Provide a short reason.";

/// Version tag of the review batch line format
pub const REVIEW_BATCH_VERSION: &str = "review_batch.v1";

// Default keyword lists

pub const DEFAULT_CHAIN_NAMES: &[&str] = &[
    "mcdonalds",
    "burger king",
    "hesburger",
    "kfc",
    "subway",
    "starbucks",
    "taco bell",
    "domino",
    "domino's",
    "pizza hut",
    "quick service",
];

pub const DEFAULT_BLOCKLIST: &[&str] = &["fuck", "shit", "bitch", "cunt", "asshole"];

// Default source field aliases, first non-blank wins

pub const NAME_ALIASES: &[&str] = &["name", "title", "restaurant_name", "venue_name", "place_name"];
pub const ADDRESS_ALIASES: &[&str] = &["full_address", "address", "location"];
pub const DESCRIPTION_ALIASES: &[&str] = &["description", "summary", "about", "notes", "why"];
pub const TAGS_ALIASES: &[&str] = &["tags", "tag", "cuisine", "category", "categories"];
pub const SOURCE_ALIASES: &[&str] = &["source"];
pub const OPENING_DATE_ALIASES: &[&str] = &["opening_date", "start_date"];

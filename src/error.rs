use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl QualityError {
    pub fn config(message: impl Into<String>) -> Self {
        QualityError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, QualityError>;

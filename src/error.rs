//! Error types shared by the pipeline and its collaborators.

use thiserror::Error;

/// Result type for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A raw record could not be turned into an entity
    #[error("invalid {kind} record: {reason}")]
    InvalidRecord { kind: &'static str, reason: String },

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid time period: {0}")]
    InvalidPeriod(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Non-success response from the upstream API
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyticsError {
    pub fn invalid_record(kind: &'static str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidRecord {
            kind,
            reason: reason.into(),
        }
    }
}

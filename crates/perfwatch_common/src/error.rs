//! Error types for the analytics core
//!
//! Only collaborator and configuration failures surface as errors.
//! Short series and zero-variance windows are ordinary outcomes and are
//! handled by returning empty results.

/// Errors raised by the analytics core
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Fewer usable samples than a method requires
    #[error("Insufficient data for {metric}: need {required} points, have {available}")]
    InsufficientData {
        metric: String,
        required: usize,
        available: usize,
    },

    /// History provider failed for a metric
    #[error("History unavailable for {metric}: {reason}")]
    HistoryUnavailable { metric: String, reason: String },

    /// Baseline store failed for a metric
    #[error("Baseline unavailable for {metric}: {reason}")]
    BaselineUnavailable { metric: String, reason: String },

    /// Persistence sink failed to append a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration is invalid or unreadable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Time period label could not be parsed
    #[error("Invalid time period '{0}' (expected e.g. 24h, 7d, 2w)")]
    InvalidPeriod(String),
}

impl From<std::io::Error> for AnalyticsError {
    fn from(e: std::io::Error) -> Self {
        AnalyticsError::Sink(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

//! Error types for VaR, covariance and beta calculations

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while estimating portfolio risk
#[derive(Error, Debug)]
pub enum RiskError {
    /// Fewer than two price observations for one or more instruments.
    /// Every affected ticker is collected before the error is raised.
    #[error("Insufficient price history (fewer than 2 observations) for: {}", .tickers.join(", "))]
    InsufficientData { tickers: Vec<String> },

    /// Positions reference tickers that have no column in the price table
    #[error("No price history for: {}", .tickers.join(", "))]
    MissingPriceData { tickers: Vec<String> },

    #[error("Degenerate NAV: {0} cannot be used to normalize VaR")]
    DegenerateNav(f64),

    #[error("Non-positive price for {ticker} on {date}")]
    NonPositivePrice { ticker: String, date: NaiveDate },

    #[error("Unknown columns: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Matrix operation failed: {0}")]
    MatrixError(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RiskError>;

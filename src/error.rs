//! Error types for the analysis core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for forecasting, backtesting and ranking.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data for {operation}: need at least {required} candles, got {actual}")]
    InsufficientData {
        operation: String,
        required: usize,
        actual: usize,
    },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid candle data: {0}")]
    InvalidData(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Coarse error classes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InsufficientData,
    InvalidInput,
    Unavailable,
    Internal,
}

impl AnalysisError {
    pub fn insufficient(operation: impl Into<String>, required: usize, actual: usize) -> Self {
        AnalysisError::InsufficientData {
            operation: operation.into(),
            required,
            actual,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalysisError::InsufficientData { .. } => ErrorCategory::InsufficientData,
            AnalysisError::InvalidParameter(_)
            | AnalysisError::InvalidData(_)
            | AnalysisError::ConfigError(_)
            | AnalysisError::TomlError(_) => ErrorCategory::InvalidInput,
            AnalysisError::ModelUnavailable(_) | AnalysisError::DataUnavailable(_) => {
                ErrorCategory::Unavailable
            }
            AnalysisError::Cancelled
            | AnalysisError::CsvError(_)
            | AnalysisError::IoError(_)
            | AnalysisError::JsonError(_) => ErrorCategory::Internal,
        }
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

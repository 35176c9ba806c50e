//! Unified error types for Scout

use thiserror::Error;

/// Unified error type for all Scout operations
#[derive(Error, Debug)]
pub enum ScoutError {
    // Listing fetch errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using ScoutError
pub type Result<T> = std::result::Result<T, ScoutError>;

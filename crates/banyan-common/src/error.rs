//! Error types for Banyan.

use thiserror::Error;

/// Result type alias using BanyanError.
pub type Result<T> = std::result::Result<T, BanyanError>;

/// Errors that can occur in Banyan operations.
#[derive(Debug, Error)]
pub enum BanyanError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Tree errors
    #[error("invalid insertion, key already present: {key}")]
    InvalidInsertion { key: String },

    #[error("invalid deletion, key not present: {key}")]
    InvalidDeletion { key: String },

    #[error("invalid degree: {degree} (minimum is 3)")]
    InvalidDegree { degree: usize },

    // Record store errors
    #[error("invalid location: {location}")]
    InvalidLocation { location: String },

    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("tree corrupted: {0}")]
    Corrupted(String),
}

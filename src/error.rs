use std::io;
use thiserror::Error;

use crate::http::HttpError;

/// Error type for loading, parsing and serving a dataset.
#[derive(Error, Debug)]
pub enum ServeError {
    /// IO error while reading a local source.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// CSV reading error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Remote fetch failed.
    #[error("fetch failed: {0}")]
    Http(#[from] HttpError),

    /// JSON encoding error.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Gzip stream could not be decompressed.
    #[error("gzip decompression failed: {0}")]
    Decompress(String),

    /// No header record or no data at all.
    #[error("No columns to parse from source")]
    EmptyData,

    /// Delimiter sniffing found no usable delimiter.
    #[error("Could not detect CSV dialect: {0}")]
    NoDialectDetected(String),

    /// Delimiter sniffing found more than one equally good delimiter.
    #[error("Ambiguous delimiter: {0:?} and {1:?} score equally")]
    AmbiguousDialect(char, char),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, ServeError>;

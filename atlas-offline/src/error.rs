//! Error types for the atlas-offline crate.

use thiserror::Error;

/// Errors that can occur in the offline store and region downloader.
///
/// Payloads are plain strings so values stay cloneable across the worker
/// boundary and into region observers.
#[derive(Debug, Clone, Error)]
pub enum OfflineError {
    /// The embedded database rejected an operation.
    #[error("Database error: {0}")]
    Database(String),

    /// A style document could not be parsed.
    #[error("Style parse error: {0}")]
    StyleParse(String),

    /// A TileJSON document could not be parsed.
    #[error("TileJSON parse error: {0}")]
    TileJsonParse(String),

    /// A resource fetch failed permanently.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// No region with the given id exists in the registry.
    #[error("Region not found: {0}")]
    RegionNotFound(i64),

    /// The database worker is gone and cannot answer.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl OfflineError {
    /// Create a new database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new style parse error.
    pub fn style_parse(msg: impl Into<String>) -> Self {
        Self::StyleParse(msg.into())
    }

    /// Create a new TileJSON parse error.
    pub fn tile_json_parse(msg: impl Into<String>) -> Self {
        Self::TileJsonParse(msg.into())
    }

    /// Create a new fetch error.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

impl From<rusqlite::Error> for OfflineError {
    fn from(err: rusqlite::Error) -> Self {
        OfflineError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OfflineError {
    fn from(err: serde_json::Error) -> Self {
        OfflineError::StyleParse(err.to_string())
    }
}

//! Stored responses and their terminal errors.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Why a fetch produced no usable payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    Success,
    /// The origin reported the resource does not exist. Cached as a
    /// negative entry so repeated lookups stay local.
    NotFound,
    /// The origin failed (5xx). Transient; never cached.
    Server,
    /// The origin could not be reached. Transient; never cached.
    Connection,
    /// Anything else the origin surfaced.
    Other,
}

impl ErrorReason {
    /// Transient failures are retried by the online source and must never
    /// be persisted, where they would poison future lookups.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorReason::Connection | ErrorReason::Server)
    }
}

/// A terminal fetch error attached to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    pub reason: ErrorReason,
    pub message: String,
}

impl ResponseError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::NotFound, message)
    }
}

/// The stored form of a fetched resource: body bytes plus HTTP freshness
/// metadata, or a terminal error.
///
/// A stored response is either a successful payload (`data` present, no
/// error) or a NotFound negative entry (no `data`, error reason NotFound).
/// A response with neither body nor error is a freshness refresh from a
/// not-modified origin answer; the store applies it to the existing entry
/// without replacing the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub data: Option<Bytes>,
    pub modified: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn not_found() -> Self {
        Self {
            error: Some(ResponseError::not_found("not found")),
            ..Self::default()
        }
    }

    pub fn from_error(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            error: Some(ResponseError::new(reason, message)),
            ..Self::default()
        }
    }

    /// A body-less, error-less response carrying only fresh metadata.
    pub fn is_refresh(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }
}

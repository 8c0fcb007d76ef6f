//! Recoverable error conditions surfaced by the tracking core.
//!
//! None of these are fatal. Location errors fall back to a default position, source
//! errors skip a poll cycle and playback errors count as a finished clip.

use thiserror::Error;

/// Failure to resolve the user's position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// No fix could be obtained (timeout, no provider, etc.)
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// The user refused location access
    #[error("location permission denied")]
    PermissionDenied,
}

/// Failure while fetching candidate aircraft from a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The backend answered with a non-success status
    #[error("data source returned status {0}")]
    Status(u16),

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// Failure to play a single narration clip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("clip '{clip}' failed to play: {reason}")]
    ClipFailed { clip: String, reason: String },

    /// The player backend has gone away
    #[error("clip player is closed")]
    PlayerClosed,
}

//! Media error types

use thiserror::Error;

use super::direction::TrackKind;

/// Errors from media mode resolution and local capture
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Invalid {0} media mode: {1}")]
    InvalidMode(TrackKind, String),

    #[error("Local media unavailable: {0}")]
    Unavailable(String),

    #[error("Access to local media denied: {0}")]
    PermissionDenied(String),
}

/// Errors from binding a stream to a display target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Requested display target '{0}' is not available")]
    TargetNotFound(String),
}

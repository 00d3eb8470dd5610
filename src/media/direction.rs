//! Media direction resolution
//!
//! Turns the user supplied mode of each track kind into independent
//! local (send) and remote (receive) intents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MediaError;

/// Track kinds negotiated independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream mode requested for a track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    Inactive,
    SendOnly,
    RecvOnly,
    #[default]
    SendRecv,
}

impl MediaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::SendOnly => "sendonly",
            Self::RecvOnly => "recvonly",
            Self::SendRecv => "sendrecv",
        }
    }

    /// Local/remote intents for this mode
    pub fn direction(&self) -> MediaDirection {
        match self {
            Self::SendRecv => MediaDirection::new(true, true),
            Self::SendOnly => MediaDirection::new(true, false),
            Self::RecvOnly => MediaDirection::new(false, true),
            Self::Inactive => MediaDirection::new(false, false),
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "sendonly" => Ok(Self::SendOnly),
            "recvonly" => Ok(Self::RecvOnly),
            "sendrecv" => Ok(Self::SendRecv),
            other => Err(other.to_string()),
        }
    }
}

/// Independent send/receive intents of one track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaDirection {
    /// Local media of this kind is sent
    pub local: bool,
    /// Remote media of this kind is received
    pub remote: bool,
}

impl MediaDirection {
    pub fn new(local: bool, remote: bool) -> Self {
        Self { local, remote }
    }
}

/// Resolve the raw mode of a track kind, `sendrecv` when absent
pub fn resolve_direction(
    kind: TrackKind,
    raw: Option<&str>,
) -> Result<(MediaMode, MediaDirection), MediaError> {
    let mode = match raw {
        None => MediaMode::default(),
        Some(value) => value
            .parse::<MediaMode>()
            .map_err(|value| MediaError::InvalidMode(kind, value))?,
    };

    Ok((mode, mode.direction()))
}

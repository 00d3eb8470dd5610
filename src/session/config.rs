//! Session configuration
//!
//! `SessionOptions` holds the raw constructor options (as given by a caller
//! or read from a JSON file); `SessionConfig` is the validated, immutable form.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::{resolve_direction, MediaDirection, MediaKinds, MediaMode, TrackKind};
use crate::peer::IceServer;
use crate::signaling::MediaConstraints;

use super::error::SessionError;

/// Default number of consecutive poll failures tolerated
pub const DEFAULT_POLL_MAX_ERROR_TRIES: u32 = 10;

/// Default backoff unit between poll retries, in milliseconds
pub const DEFAULT_POLL_BACKOFF_UNIT_MS: u64 = 1;

/// Raw session options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Audio mode: inactive, sendonly, recvonly or sendrecv (default)
    #[serde(default)]
    pub audio: Option<String>,

    /// Video mode: inactive, sendonly, recvonly or sendrecv (default)
    #[serde(default)]
    pub video: Option<String>,

    /// ICE servers (None = public STUN server)
    #[serde(default)]
    pub ice_servers: Option<Vec<IceServer>>,

    /// Display target for the local stream
    #[serde(default)]
    pub local_video_tag: Option<String>,

    /// Display target for the remote stream
    #[serde(default)]
    pub remote_video_tag: Option<String>,

    /// Consecutive poll failures tolerated before giving up
    #[serde(default)]
    pub poll_max_error_tries: Option<u32>,

    /// Backoff unit between poll retries in milliseconds
    #[serde(default)]
    pub poll_backoff_unit_ms: Option<u64>,
}

impl SessionOptions {
    /// Load options from a JSON file
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidConfiguration(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json)
            .map_err(|e| SessionError::InvalidConfiguration(format!("Invalid options: {}", e)))
    }
}

/// Poll retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_error_tries: u32,
    pub backoff_unit: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_error_tries: DEFAULT_POLL_MAX_ERROR_TRIES,
            backoff_unit: Duration::from_millis(DEFAULT_POLL_BACKOFF_UNIT_MS),
        }
    }
}

/// Validated session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    endpoint: String,
    audio_mode: MediaMode,
    video_mode: MediaMode,
    audio: MediaDirection,
    video: MediaDirection,
    ice_servers: Vec<IceServer>,
    local_video_tag: Option<String>,
    remote_video_tag: Option<String>,
    poll: PollPolicy,
}

impl SessionConfig {
    /// Validate the options
    ///
    /// Fails before any I/O when both tracks are inactive or a mode is unknown.
    pub fn new(endpoint: &str, options: SessionOptions) -> Result<Self, SessionError> {
        if endpoint.trim().is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "Endpoint URL must not be empty".to_string(),
            ));
        }

        if options.audio.as_deref() == Some("inactive")
            && options.video.as_deref() == Some("inactive")
        {
            return Err(SessionError::InvalidConfiguration(
                "At least one audio or video must be enabled".to_string(),
            ));
        }

        let (audio_mode, audio) = resolve_direction(TrackKind::Audio, options.audio.as_deref())
            .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;
        let (video_mode, video) = resolve_direction(TrackKind::Video, options.video.as_deref())
            .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;

        let ice_servers = match options.ice_servers {
            Some(servers) if !servers.is_empty() => servers,
            _ => vec![IceServer::default_stun()],
        };

        let max_error_tries = options
            .poll_max_error_tries
            .unwrap_or(DEFAULT_POLL_MAX_ERROR_TRIES);
        // 2^tries must stay representable
        if max_error_tries > 32 {
            return Err(SessionError::InvalidConfiguration(format!(
                "Invalid poll retry ceiling: {}. Must be at most 32",
                max_error_tries
            )));
        }

        let poll = PollPolicy {
            max_error_tries,
            backoff_unit: Duration::from_millis(
                options
                    .poll_backoff_unit_ms
                    .unwrap_or(DEFAULT_POLL_BACKOFF_UNIT_MS),
            ),
        };

        Ok(Self {
            endpoint: endpoint.to_string(),
            audio_mode,
            video_mode,
            audio,
            video,
            ice_servers,
            local_video_tag: options.local_video_tag,
            remote_video_tag: options.remote_video_tag,
            poll,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn audio_mode(&self) -> MediaMode {
        self.audio_mode
    }

    pub fn video_mode(&self) -> MediaMode {
        self.video_mode
    }

    pub fn audio(&self) -> MediaDirection {
        self.audio
    }

    pub fn video(&self) -> MediaDirection {
        self.video
    }

    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    pub fn local_video_tag(&self) -> Option<&str> {
        self.local_video_tag.as_deref()
    }

    pub fn remote_video_tag(&self) -> Option<&str> {
        self.remote_video_tag.as_deref()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Kinds of local media to capture
    pub fn local_kinds(&self) -> MediaKinds {
        MediaKinds::new(self.audio.local, self.video.local)
    }

    /// Kinds of remote media to receive
    pub fn remote_kinds(&self) -> MediaKinds {
        MediaKinds::new(self.audio.remote, self.video.remote)
    }

    /// Constraints sent along with the offer
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            audio: self.audio_mode,
            video: self.video_mode,
        }
    }
}

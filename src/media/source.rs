//! Local media acquisition
//!
//! The capture devices themselves belong to the platform; the session only
//! asks for a stream carrying the kinds it intends to send.

use futures_util::future::BoxFuture;
use uuid::Uuid;

use super::direction::TrackKind;
use super::error::MediaError;

/// Kinds of media requested from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaKinds {
    pub audio: bool,
    pub video: bool,
}

impl MediaKinds {
    pub fn new(audio: bool, video: bool) -> Self {
        Self { audio, video }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }

    pub fn contains(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video,
        }
    }
}

/// Handle to a media stream owned by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    id: String,
    kinds: MediaKinds,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, kinds: MediaKinds) -> Self {
        Self {
            id: id.into(),
            kinds,
        }
    }

    /// Create a stream handle with a generated id
    pub fn generate(kinds: MediaKinds) -> Self {
        Self::new(Uuid::new_v4().to_string(), kinds)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kinds(&self) -> MediaKinds {
        self.kinds
    }

    pub fn has_audio(&self) -> bool {
        self.kinds.audio
    }

    pub fn has_video(&self) -> bool {
        self.kinds.video
    }
}

/// Source of local capture streams
pub trait MediaSource: Send + Sync {
    /// Acquire a stream carrying exactly the requested kinds
    fn acquire(&self, kinds: MediaKinds) -> BoxFuture<'_, Result<MediaStream, MediaError>>;
}

//! Notifications delivered to the embedding application

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::media::MediaStream;

use super::error::SessionError;

/// A session notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The session is established
    Start,
    /// The session ended without error
    Terminate,
    /// The session ended because of an error
    Error(SessionError),
    /// A local stream was resolved
    LocalStream(MediaStream),
    /// A remote stream was resolved
    RemoteStream(MediaStream),
    /// One event queued by the server
    MediaEvent(Value),
}

impl Notification {
    /// Event name as seen by the application
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Terminate => "terminate",
            Self::Error(_) => "error",
            Self::LocalStream(_) => "localstream",
            Self::RemoteStream(_) => "remotestream",
            Self::MediaEvent(_) => "mediaevent",
        }
    }

    /// Whether this notification ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate | Self::Error(_))
    }
}

/// Callback receiving every notification
pub type NotificationCallback = Box<dyn Fn(Notification) + Send + Sync + 'static>;

/// Dispatches notifications to the registered callback
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    callback: Option<Arc<NotificationCallback>>,
}

impl Notifier {
    pub(crate) fn new(callback: Option<Arc<NotificationCallback>>) -> Self {
        Self { callback }
    }

    pub(crate) fn emit(&self, notification: Notification) {
        trace!("Notification: {}", notification.name());
        if let Some(ref callback) = self.callback {
            callback(notification);
        }
    }
}

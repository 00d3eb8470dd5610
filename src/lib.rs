//! webrtc-content - WebRTC session controller for JSON-RPC signaling servers
//!
//! This library negotiates a WebRTC media session against a signaling server,
//! binds the negotiated streams and long-polls the server for session events.

pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use session::{
    Notification, Platform, SessionConfig, SessionController, SessionError, SessionHandle,
    SessionOptions,
};

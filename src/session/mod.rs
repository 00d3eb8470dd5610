//! Session module
//!
//! Configuration, negotiation, event polling and the controller tying them
//! together.

mod config;
mod controller;
mod error;
mod events;
mod negotiation;
mod notification;
mod poller;
mod state;

pub use config::{
    PollPolicy, SessionConfig, SessionOptions, DEFAULT_POLL_BACKOFF_UNIT_MS,
    DEFAULT_POLL_MAX_ERROR_TRIES,
};
pub use controller::{Platform, SessionController, SessionHandle};
pub use error::SessionError;
pub use notification::{Notification, NotificationCallback};
pub use poller::retry_delay;
pub use state::{NegotiationState, PollState, Session};

//! Media module
//!
//! Media modes and directions, local capture and display binding.

mod direction;
mod display;
mod error;
mod source;

pub use direction::{resolve_direction, MediaDirection, MediaMode, TrackKind};
pub use display::{DisplayRegistry, DisplaySink};
pub use error::{DisplayError, MediaError};
pub use source::{MediaKinds, MediaSource, MediaStream};

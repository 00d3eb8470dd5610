//! Display binding
//!
//! Binding a negotiated stream to a named display target. A missing target is
//! an error since the caller explicitly asked for it.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::error::DisplayError;
use super::source::MediaStream;

/// Sink that renders streams on named targets
pub trait DisplaySink: Send + Sync {
    fn bind(&self, target: &str, stream: &MediaStream) -> Result<(), DisplayError>;
}

/// In-memory set of display targets
///
/// Targets must be registered before a stream can be bound to them.
#[derive(Debug, Default)]
pub struct DisplayRegistry {
    targets: Mutex<HashMap<String, Option<MediaStream>>>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given targets
    pub fn with_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for target in targets {
            registry.register(target);
        }
        registry
    }

    /// Register an empty target
    pub fn register(&self, target: impl Into<String>) {
        self.targets.lock().entry(target.into()).or_insert(None);
    }

    /// Stream currently bound to a target
    pub fn bound(&self, target: &str) -> Option<MediaStream> {
        self.targets.lock().get(target).cloned().flatten()
    }
}

impl DisplaySink for DisplayRegistry {
    fn bind(&self, target: &str, stream: &MediaStream) -> Result<(), DisplayError> {
        let mut targets = self.targets.lock();
        let slot = targets
            .get_mut(target)
            .ok_or_else(|| DisplayError::TargetNotFound(target.to_string()))?;

        debug!("Bound stream {} to display target {}", stream.id(), target);
        *slot = Some(stream.clone());
        Ok(())
    }
}

//! Event dispatcher trait and implementations.

use tracing::{debug, info, Level};

use super::PipelineEvent;

/// Publishes events to the engine bus.
///
/// Implementations must not block and must never fail the caller; delivery
/// problems are logged and dropped.
pub trait EventDispatcher: Send + Sync {
    /// Publishes one event.
    fn dispatch(&self, event: PipelineEvent);
}

/// A dispatcher that writes events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventDispatcher {
    level: Level,
}

impl Default for LoggingEventDispatcher {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventDispatcher {
    /// Creates a dispatcher logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level dispatcher.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventDispatcher for LoggingEventDispatcher {
    fn dispatch(&self, event: PipelineEvent) {
        let event_type = event.event_type();
        let data = event.to_json();
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, build_id = %event.build_id(), event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type = %event_type, build_id = %event.build_id(), event_data = %data, "Event: {}", event_type);
        }
    }
}

/// A dispatcher that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventDispatcher {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was dispatched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventDispatcher for CollectingEventDispatcher {
    fn dispatch(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

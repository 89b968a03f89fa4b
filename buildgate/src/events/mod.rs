//! Lifecycle events published to the engine bus.
//!
//! Dispatch is fire-and-forget: callers never wait for, or fail on,
//! delivery.

mod dispatcher;
mod event;

pub use dispatcher::{CollectingEventDispatcher, EventDispatcher, LoggingEventDispatcher};
pub use event::{ActionType, PipelineEvent};

//! Access to event data owned by the surrounding application.

use rundinner_core::ConstraintModel;
use thiserror::Error;

use crate::run::EventId;

/// Errors raised while loading an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventSourceError {
    /// The event does not exist.
    #[error("event {event} is unknown")]
    UnknownEvent {
        /// The requested event.
        event: EventId,
    },
    /// The event exists but its teams or courses are not usable.
    #[error("event {event} cannot be loaded: {message}")]
    Invalid {
        /// The requested event.
        event: EventId,
        /// What is wrong with it.
        message: String,
    },
}

/// Loads the read-only constraint model of an event.
///
/// Implemented by the application that owns teams and courses; the
/// orchestrator never writes through it.
pub trait EventSource: Send + Sync {
    /// Build the model for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError`] when the event is unknown or invalid.
    fn load_model(&self, event: EventId) -> Result<ConstraintModel, EventSourceError>;
}

//! Dispatch error types

use thiserror::Error;

use crate::channel::ChannelType;
use crate::queue::QueueBackendError;
use crate::template::TemplateError;

use super::types::EventType;

/// Errors raised by the dispatcher.
///
/// Delivery failures are not errors: they advance the fallback chain and end
/// up in [`JobOutcome`](super::JobOutcome). These variants are configuration
/// or infrastructure problems that retrying the chain cannot fix.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No template registered for {event_type} on channel {channel}")]
    TemplateMissing {
        event_type: EventType,
        channel: ChannelType,
    },

    #[error("Render failed: {0}")]
    Render(#[from] TemplateError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueBackendError),
}

//! Visitor notification dispatch.
//!
//! Delivers visitor-management events to hosts and visitors over SMS, email
//! and chat using per-event fallback chains, and relays the same events to
//! signed webhook subscribers.

// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;

// Core primitives
pub mod clock;
pub mod retry;

// Domain layer
pub mod channel;
pub mod notification;
pub mod queue;
pub mod ratelimit;
pub mod template;
pub mod webhook;

// Application layer
pub mod api;
pub mod server;
pub mod worker;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;

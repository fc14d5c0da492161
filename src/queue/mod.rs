//! Delayed job queue for notification dispatch.
//!
//! Jobs are enqueued with a delay and handed to workers once due. A claimed
//! job is leased: it stays invisible to other workers until it is completed
//! or rescheduled, or until its lease runs out (the worker crashed), at which
//! point [`JobQueueBackend::recover_stale`] makes it due again. Delivery is
//! therefore at-least-once.
//!
//! Backends:
//! - [`MemoryJobQueue`]: process-local, lost on restart
//! - [`RedisJobQueue`]: durable across restarts, shared between processes

mod backend;
mod factory;
mod memory_backend;
mod redis_backend;

pub use backend::{JobQueueBackend, QueueBackendError, QueueBackendStats};
pub use factory::create_queue_backend;
pub use memory_backend::MemoryJobQueue;
pub use redis_backend::RedisJobQueue;

//! Notification dispatch.
//!
//! [`NotificationService::emit`] turns an event into a queued job after the
//! fallback-chain and rate-limit checks. Workers hand due jobs to
//! [`NotificationService::handle_job`], which walks the chain in order until
//! one provider delivers and schedules a whole-chain retry with backoff when
//! every provider failed.

mod error;
mod service;
mod types;

pub use error::DispatchError;
pub use service::{DispatchStats, DispatchStatsSnapshot, NotificationService};
pub use types::{
    EmitOutcome, EmitRequest, EventType, JobDisposition, JobOutcome, NotificationJob, SkipReason,
    StepRecord, StepResult,
};

//! Send-rate limiting for notification subjects.
//!
//! Each subject (usually the recipient) has fixed hourly and daily windows,
//! and each scope under it (usually one visit) has a lifetime cap. All caps
//! must pass for a send to be authorized.
//!
//! Windows reset on expiry rather than leaking, so a burst straddling a
//! window boundary can reach up to twice the nominal rate.

mod config;
mod limiter;
mod window;

pub use config::RateLimitConfig;
pub use limiter::{RateCap, RateLimitResult, RateLimiterStats, SendRateLimiter, SubjectSnapshot};
pub use window::FixedWindow;

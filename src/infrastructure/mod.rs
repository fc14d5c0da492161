//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Operational API error type
//! - `metrics`: Prometheus metrics helpers
//! - `redis`: Redis connection used by the durable job queue

pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;

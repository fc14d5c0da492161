//! Redis connectivity for the durable job queue.

pub mod pool;

pub use pool::{PoolError, RedisPool};

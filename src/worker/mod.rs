//! Background workers that drain the job queue.

mod pool;

pub use pool::{WorkerPool, WorkerStats};

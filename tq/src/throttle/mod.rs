//! Throttle for async work items
//!
//! Admits at most N work items per fixed interval, queues the rest in FIFO
//! order, and drains the queue from a self-correcting timer task.

mod config;
mod core;
mod drainer;
mod queue;
mod state;

pub use config::{Limits, ThrottleConfig};
pub use self::core::{Submission, Throttle, create_throttle};
pub(crate) use self::core::Shared;
pub use queue::{QueueState, ThrottleStats};

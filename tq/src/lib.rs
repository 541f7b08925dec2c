//! throttlequeue - rate-limiting execution queue
//!
//! Admits at most N asynchronous work items per fixed interval and queues the
//! rest, optionally spacing admissions evenly across the interval. Built to sit
//! in front of anything with an external rate limit: API clients, crawlers,
//! batch schedulers.
//!
//! # Core Concepts
//!
//! - **Windows**: each interval admits up to `max_per_interval` items; the
//!   rest wait in strict FIFO order
//! - **Drainer**: a tokio task armed only while items are queued, releasing
//!   one batch per interval and correcting itself if it wakes early
//! - **Even spacing**: "N per T" becomes "1 per T/N"
//! - **Registry**: every throttle can be torn down together with [`dispose_all`]
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), throttlequeue::ThrottleError> {
//! let throttle = throttlequeue::create_throttle(5, 1000, false)?;
//! let body = throttle.submit(|| async { "fetched" }).await?;
//! assert_eq!(body, "fetched");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`throttle`] - the controller, its state machine and drainer
//! - [`registry`] - bulk teardown
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface for the `tq` binary

pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod throttle;

// Re-export commonly used types
pub use config::Config;
pub use error::ThrottleError;
pub use registry::{Registry, dispose_all};
pub use throttle::{Limits, QueueState, Submission, Throttle, ThrottleConfig, ThrottleStats, create_throttle};

//! Queue types for the throttle

use tokio::time::Instant;

/// Outcome of submitting a job to the state machine
#[derive(Debug)]
pub enum Admission<J> {
    /// Capacity available in the current window, run it now
    Run(J),

    /// Queued; `arm_at` is set when this submission armed the drainer
    Queued { arm_at: Option<Instant> },
}

/// Outcome of a drainer wake-up
#[derive(Debug)]
pub enum Wakeup<J> {
    /// Woke before the window ended; sleep again until `deadline`
    Early { deadline: Instant },

    /// Window elapsed; run `batch`, then sleep until `next` if set
    Drained { batch: Vec<J>, next: Option<Instant> },

    /// Timer is no longer wanted (disposed or stale)
    Cancelled,
}

/// Drainer timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Idle,
    Armed { deadline: Instant },
    Disposed,
}

impl Timer {
    pub fn is_armed(&self) -> bool {
        matches!(self, Timer::Armed { .. })
    }
}

/// Statistics for a throttle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThrottleStats {
    pub total_submitted: u64,
    pub total_admitted: u64,
    pub total_queued: u64,
    pub total_completed: u64,
    pub total_panicked: u64,
    pub peak_queue_depth: usize,
    pub peak_active: usize,
}

/// Live counters of a throttle, taken atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    /// Work items currently running
    pub length: usize,
    /// Work items waiting for a window
    pub queue: usize,
    /// `length + queue`
    pub total: usize,
    pub disposed: bool,
}

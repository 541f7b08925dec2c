//! Admission and drain state machine
//!
//! Pure bookkeeping: every transition takes `now` explicitly, so the
//! controller, the drainer and the tests all drive the same code with
//! whatever clock they have.

use std::collections::VecDeque;

use tokio::time::Instant;
use tracing::debug;

use super::config::Limits;
use super::queue::{Admission, QueueState, ThrottleStats, Timer, Wakeup};

/// Per-throttle state, generic over the queued job type
#[derive(Debug)]
pub struct ThrottleState<J> {
    limits: Limits,

    /// Jobs waiting for a window, in submission order
    pending: VecDeque<J>,

    /// Start of the current admission window (None until the first admission)
    interval_start: Option<Instant>,

    /// Jobs admitted since `interval_start`
    admitted: usize,

    timer: Timer,

    /// Jobs admitted but not yet settled
    active: usize,

    stats: ThrottleStats,
}

impl<J> ThrottleState<J> {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            pending: VecDeque::new(),
            interval_start: None,
            admitted: 0,
            timer: Timer::Idle,
            active: 0,
            stats: ThrottleStats::default(),
        }
    }

    fn window_end(&self) -> Option<Instant> {
        self.interval_start.map(|start| start + self.limits.interval)
    }

    fn window_lapsed(&self, now: Instant) -> bool {
        match self.interval_start {
            Some(start) => now.saturating_duration_since(start) > self.limits.interval,
            None => true,
        }
    }

    fn start_window(&mut self, now: Instant) {
        self.interval_start = Some(now);
        self.admitted = 0;
    }

    fn mark_active(&mut self) {
        self.active += 1;
        self.stats.total_admitted += 1;
        self.stats.peak_active = self.stats.peak_active.max(self.active);
    }

    /// Submit a job at `now`
    pub fn admit(&mut self, job: J, now: Instant) -> Admission<J> {
        self.stats.total_submitted += 1;

        if self.timer == Timer::Idle && self.window_lapsed(now) {
            debug!("ThrottleState::admit: window lapsed, starting a new one");
            self.start_window(now);
        }

        self.admitted += 1;
        if self.admitted <= self.limits.max_per_interval {
            self.mark_active();
            return Admission::Run(job);
        }

        self.pending.push_back(job);
        self.stats.total_queued += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.pending.len());

        if self.timer != Timer::Idle {
            return Admission::Queued { arm_at: None };
        }

        // interval_start is always set here: the lapsed check above started a window
        let deadline = self.window_end().unwrap_or(now);
        debug!(?deadline, "ThrottleState::admit: arming drainer");
        self.timer = Timer::Armed { deadline };
        Admission::Queued { arm_at: Some(deadline) }
    }

    /// Handle a drainer wake-up at `now`
    pub fn wake(&mut self, now: Instant) -> Wakeup<J> {
        if !self.timer.is_armed() {
            debug!(timer = ?self.timer, "ThrottleState::wake: timer not armed, cancelling");
            return Wakeup::Cancelled;
        }

        match self.window_end() {
            Some(end) if now < end => {
                debug!(remaining = ?(end - now), "ThrottleState::wake: fired early, re-arming");
                self.timer = Timer::Armed { deadline: end };
                return Wakeup::Early { deadline: end };
            }
            _ => {}
        }

        self.start_window(now);
        let take = self.limits.max_per_interval.min(self.pending.len());
        let batch: Vec<J> = self.pending.drain(..take).collect();
        for _ in 0..batch.len() {
            self.admitted += 1;
            self.mark_active();
        }

        let next = if self.pending.is_empty() {
            self.timer = Timer::Idle;
            None
        } else {
            let deadline = now + self.limits.interval;
            self.timer = Timer::Armed { deadline };
            Some(deadline)
        };
        debug!(drained = batch.len(), remaining = self.pending.len(), "ThrottleState::wake: drained");
        Wakeup::Drained { batch, next }
    }

    /// Record that an admitted job settled
    pub fn settle(&mut self, panicked: bool) {
        self.active = self.active.saturating_sub(1);
        self.stats.total_completed += 1;
        if panicked {
            self.stats.total_panicked += 1;
        }
    }

    /// Stop all future draining. Returns true if a timer was armed.
    pub fn dispose(&mut self) -> bool {
        let was_armed = self.timer.is_armed();
        self.timer = Timer::Disposed;
        was_armed
    }

    pub fn length(&self) -> usize {
        self.active
    }

    pub fn queue(&self) -> usize {
        self.pending.len()
    }

    pub fn total(&self) -> usize {
        self.active + self.pending.len()
    }

    pub fn snapshot(&self) -> QueueState {
        QueueState {
            length: self.length(),
            queue: self.queue(),
            total: self.total(),
            disposed: self.timer == Timer::Disposed,
        }
    }

    pub fn stats(&self) -> &ThrottleStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn timer(&self) -> Timer {
        self.timer
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    #[cfg(test)]
    pub fn interval_start(&self) -> Option<Instant> {
        self.interval_start
    }
}

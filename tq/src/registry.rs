//! Registry of throttles for bulk teardown
//!
//! Entries are weak: the registry never keeps a throttle alive. A throttle
//! lives as long as a handle, its drainer or one of its running jobs does.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use crate::throttle::{Shared, Throttle};

/// Process-wide registry used by [`Throttle::new`] and [`dispose_all`]
static GLOBAL: Registry = Registry::new();

/// Get the process-wide registry
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Cancel the timer of every throttle in the process-wide registry.
///
/// Intended for process shutdown. Queued items stay queued and their
/// submissions stay pending. Returns how many armed timers were cancelled.
pub fn dispose_all() -> usize {
    GLOBAL.dispose_all()
}

/// A set of throttles that can be torn down together
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<Vec<Weak<Shared>>>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Weak<Shared>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a throttle; registering the same throttle twice is a no-op
    pub fn register(&self, throttle: &Throttle) {
        let weak = Arc::downgrade(throttle.shared());
        let mut entries = self.entries();
        entries.retain(|entry| entry.strong_count() > 0);
        if !entries.iter().any(|entry| entry.ptr_eq(&weak)) {
            entries.push(weak);
        }
        debug!(id = throttle.id(), registered = entries.len(), "Registry::register: called");
    }

    /// Remove a throttle. Returns false if it was not registered.
    pub fn unregister(&self, throttle: &Throttle) -> bool {
        let weak = Arc::downgrade(throttle.shared());
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|entry| !entry.ptr_eq(&weak));
        let removed = entries.len() != before;
        debug!(id = throttle.id(), removed, "Registry::unregister: called");
        removed
    }

    /// Cancel every registered throttle's timer
    pub fn dispose_all(&self) -> usize {
        let live: Vec<Arc<Shared>> = {
            let mut entries = self.entries();
            entries.retain(|entry| entry.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };

        let cancelled = live.iter().filter(|shared| shared.dispose()).count();
        info!(throttles = live.len(), cancelled, "Registry::dispose_all: timers cancelled");
        cancelled
    }

    /// Number of live registered throttles
    pub fn len(&self) -> usize {
        self.entries().iter().filter(|entry| entry.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

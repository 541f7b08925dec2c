//! Throttle implementation

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ThrottleError;
use crate::registry::{self, Registry};

use super::config::ThrottleConfig;
use super::drainer;
use super::queue::{Admission, QueueState, ThrottleStats};
use super::state::ThrottleState;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A queued invocation; called with the guard that settles it
pub(crate) type Job = Box<dyn FnOnce(SettleGuard) + Send + 'static>;

pub(crate) struct Inner {
    pub(crate) state: ThrottleState<Job>,

    /// Handle of the one outstanding drainer task, if armed
    pub(crate) drainer: Option<AbortHandle>,
}

/// State shared by every handle, the drainer and in-flight jobs
pub(crate) struct Shared {
    pub(crate) id: u64,
    inner: Mutex<Inner>,
}

impl Shared {
    /// Never held across an await
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the drainer and stop it from ever re-arming
    pub(crate) fn dispose(&self) -> bool {
        let mut inner = self.lock();
        let was_armed = inner.state.dispose();
        if let Some(handle) = inner.drainer.take() {
            handle.abort();
        }
        debug!(id = self.id, was_armed, "Shared::dispose: timer cancelled");
        was_armed
    }
}

/// Decrements the active count when dropped, on every exit path of a job
pub(crate) struct SettleGuard {
    shared: Arc<Shared>,
    panicked: bool,
}

impl SettleGuard {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared, panicked: false }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.shared.lock().state.settle(self.panicked);
    }
}

/// Rate-limiting execution queue.
///
/// Admits at most `max_per_interval` work items per interval and queues the
/// rest in FIFO order. Queued items are released by a drainer task at each
/// interval boundary. Cloning gives another handle to the same queue.
///
/// `submit` spawns tokio tasks, so it must be called from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct Throttle {
    shared: Arc<Shared>,
}

impl Throttle {
    /// Create a throttle registered with the process-wide registry
    pub fn new(config: ThrottleConfig) -> Result<Self, ThrottleError> {
        Self::with_registry(config, registry::global())
    }

    /// Create a throttle registered with `registry`
    pub fn with_registry(config: ThrottleConfig, registry: &Registry) -> Result<Self, ThrottleError> {
        debug!(?config, "Throttle::with_registry: called");
        let limits = config.limits()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let throttle = Self {
            shared: Arc::new(Shared {
                id,
                inner: Mutex::new(Inner {
                    state: ThrottleState::new(limits),
                    drainer: None,
                }),
            }),
        };
        registry.register(&throttle);

        info!(
            id,
            max_per_interval = limits.max_per_interval,
            interval = ?limits.interval,
            evenly_spaced = config.evenly_spaced,
            "Throttle created"
        );
        Ok(throttle)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Submit a work item.
    ///
    /// The item runs now if the current window has capacity, otherwise it is
    /// queued behind earlier items. The returned [`Submission`] resolves with
    /// the item's output, or [`ThrottleError::Panicked`] if it panicked.
    /// Dropping the `Submission` does not cancel the item.
    pub fn submit<F, Fut>(&self, work: F) -> Submission<Fut::Output>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |guard| {
            tokio::spawn(run_job(work, guard, tx));
        });

        let admission = {
            let mut inner = self.shared.lock();
            let admission = inner.state.admit(job, Instant::now());
            if let Admission::Queued { arm_at: Some(deadline) } = &admission {
                // Spawned under the lock so the handle is stored before the drainer can clear it
                let handle = tokio::spawn(drainer::run(Arc::clone(&self.shared), *deadline));
                inner.drainer = Some(handle.abort_handle());
            }
            admission
        };

        match admission {
            Admission::Run(job) => {
                debug!(id = self.shared.id, "Throttle::submit: admitted immediately");
                job(SettleGuard::new(Arc::clone(&self.shared)));
            }
            Admission::Queued { arm_at } => {
                debug!(id = self.shared.id, armed = arm_at.is_some(), "Throttle::submit: queued");
            }
        }

        Submission { rx }
    }

    /// Number of work items currently running
    pub fn length(&self) -> usize {
        self.shared.lock().state.length()
    }

    /// Number of work items waiting for a window
    pub fn queue(&self) -> usize {
        self.shared.lock().state.queue()
    }

    /// Running plus waiting
    pub fn total(&self) -> usize {
        self.shared.lock().state.total()
    }

    /// All three counters taken under one lock
    pub fn snapshot(&self) -> QueueState {
        self.shared.lock().state.snapshot()
    }

    pub fn stats(&self) -> ThrottleStats {
        self.shared.lock().state.stats().clone()
    }

    /// Effective interval (after even-spacing normalization)
    pub fn interval(&self) -> Duration {
        self.shared.lock().state.limits().interval
    }

    /// Effective capacity per interval (1 when evenly spaced)
    pub fn max_per_interval(&self) -> usize {
        self.shared.lock().state.limits().max_per_interval
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Cancel this throttle's timer. Queued items stay queued and their
    /// submissions stay pending; running items are not affected.
    pub fn dispose(&self) -> bool {
        debug!(id = self.shared.id, "Throttle::dispose: called");
        self.shared.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.snapshot().disposed
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("id", &self.shared.id)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Create a throttle admitting `max_per_interval` items per `interval_ms`,
/// registered with the process-wide registry.
///
/// With `evenly_spaced`, admissions are spread one per
/// `interval_ms / max_per_interval` instead of bursting.
pub fn create_throttle(max_per_interval: u32, interval_ms: u64, evenly_spaced: bool) -> Result<Throttle, ThrottleError> {
    Throttle::new(ThrottleConfig::new(max_per_interval, interval_ms, evenly_spaced))
}

async fn run_job<F, Fut>(work: F, mut guard: SettleGuard, tx: oneshot::Sender<Result<Fut::Output, ThrottleError>>)
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    let outcome = AssertUnwindSafe(async move { work().await }).catch_unwind().await;
    let result = outcome.map_err(|payload| ThrottleError::Panicked(panic_message(payload.as_ref())));

    if let Err(err) = &result {
        warn!(id = guard.shared.id, %err, "Work item panicked");
        guard.panicked = true;
    }
    // Settle before resolving so an awaiting caller sees the decremented count
    drop(guard);

    // Receiver may have been dropped by the caller
    let _ = tx.send(result);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Pending result of a submitted work item
pub struct Submission<T> {
    rx: oneshot::Receiver<Result<T, ThrottleError>>,
}

impl<T> Future for Submission<T> {
    type Output = Result<T, ThrottleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ThrottleError::Dropped)))
    }
}

impl<T> fmt::Debug for Submission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission").finish_non_exhaustive()
    }
}

//! Interval drainer
//!
//! One task per armed throttle. It sleeps until the armed deadline, asks the
//! state machine what to do with the wake-up and either sleeps again (early
//! wake-up or more work queued) or exits once the queue is empty.

use std::sync::Arc;

use tokio::time::{Instant, sleep_until};
use tracing::debug;

use super::core::{SettleGuard, Shared};
use super::queue::Wakeup;

pub(crate) async fn run(shared: Arc<Shared>, mut deadline: Instant) {
    debug!(id = shared.id, ?deadline, "drainer::run: armed");
    loop {
        sleep_until(deadline).await;

        let wakeup = {
            let mut inner = shared.lock();
            let wakeup = inner.state.wake(Instant::now());
            if let Wakeup::Drained { next: None, .. } = &wakeup {
                inner.drainer = None;
            }
            wakeup
        };

        match wakeup {
            Wakeup::Early { deadline: end } => {
                debug!(id = shared.id, "drainer::run: woke early, re-armed");
                deadline = end;
            }
            Wakeup::Drained { batch, next } => {
                debug!(id = shared.id, released = batch.len(), "drainer::run: releasing batch");
                for job in batch {
                    job(SettleGuard::new(Arc::clone(&shared)));
                }
                match next {
                    Some(next) => deadline = next,
                    None => {
                        debug!(id = shared.id, "drainer::run: queue empty, going idle");
                        return;
                    }
                }
            }
            Wakeup::Cancelled => {
                debug!(id = shared.id, "drainer::run: cancelled");
                return;
            }
        }
    }
}

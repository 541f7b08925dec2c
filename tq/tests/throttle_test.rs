//! Integration tests for the throttle
//!
//! Timing tests run on a paused tokio clock, so admission instants are exact.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use throttlequeue::{Throttle, ThrottleConfig, ThrottleError, create_throttle};
use tokio::time::Instant;

const JITTER: Duration = Duration::from_millis(1);

/// Submit `count` items that record their admission instant, wait for all
fn record_admissions(throttle: &Throttle, count: usize) -> (Arc<Mutex<Vec<Instant>>>, Vec<throttlequeue::Submission<()>>) {
    let admitted = Arc::new(Mutex::new(Vec::with_capacity(count)));
    let subs = (0..count)
        .map(|_| {
            let admitted = Arc::clone(&admitted);
            throttle.submit(move || async move {
                admitted.lock().unwrap().push(Instant::now());
            })
        })
        .collect();
    (admitted, subs)
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_five_admit_immediately() {
    let throttle = create_throttle(5, 1000, false).unwrap();
    let t0 = Instant::now();

    let (admitted, subs) = record_admissions(&throttle, 5);
    assert_eq!(throttle.length(), 5);
    assert_eq!(throttle.queue(), 0);

    futures::future::join_all(subs).await;
    let admitted = admitted.lock().unwrap();
    assert_eq!(admitted.len(), 5);
    assert!(admitted.iter().all(|at| *at == t0));
}

#[tokio::test(start_paused = true)]
async fn test_queue_length_reporting() {
    let throttle = create_throttle(2, 1000, false).unwrap();

    let _a = throttle.submit(|| tokio::time::sleep(Duration::from_millis(500)));
    let _b = throttle.submit(|| tokio::time::sleep(Duration::from_millis(500)));
    let _c = throttle.submit(futures::future::pending::<()>);

    assert_eq!(throttle.length(), 2);
    assert_eq!(throttle.queue(), 1);
    assert_eq!(throttle.total(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_length_plus_queue_equals_total_throughout() {
    let throttle = create_throttle(3, 20, false).unwrap();

    let subs: Vec<_> = (0..30)
        .map(|i| throttle.submit(move || tokio::time::sleep(Duration::from_millis(5 * (i % 7)))))
        .collect();

    let handle = tokio::spawn(futures::future::join_all(subs));
    for _ in 0..50 {
        let snap = throttle.snapshot();
        assert_eq!(snap.length + snap.queue, snap.total);
        assert_eq!(throttle.length() + throttle.queue(), throttle.total());
        tokio::time::sleep(Duration::from_millis(7)).await;
    }
    handle.await.unwrap();
    assert_eq!(throttle.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queues_all_sequential_submissions() {
    let throttle = create_throttle(1, 10, false).unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let count = Arc::clone(&count);
        throttle
            .submit(move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 100);
}

#[tokio::test(start_paused = true)]
async fn test_second_item_waits_for_first_window() {
    let throttle = create_throttle(1, 1000, false).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    throttle
        .submit(move || async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

    let flag = Arc::clone(&done);
    let saw_done = throttle.submit(move || async move { flag.load(Ordering::SeqCst) }).await.unwrap();
    assert!(saw_done);
}

// =============================================================================
// Interval honoring
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_per_interval_is_honored() {
    let interval = Duration::from_millis(50);
    let throttle = create_throttle(1, 50, false).unwrap();

    let (admitted, subs) = record_admissions(&throttle, 100);
    futures::future::join_all(subs).await;

    let admitted = admitted.lock().unwrap();
    assert_eq!(admitted.len(), 100);
    for pair in admitted.windows(2) {
        assert!(pair[1] - pair[0] >= interval - JITTER, "admissions {:?} apart", pair[1] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_several_per_interval_is_honored() {
    let interval = Duration::from_millis(50);
    let throttle = create_throttle(5, 50, false).unwrap();

    let (admitted, subs) = record_admissions(&throttle, 100);
    futures::future::join_all(subs).await;

    let admitted = admitted.lock().unwrap();
    assert_eq!(admitted.len(), 100);

    let mut window_start = admitted[0];
    let mut in_window = 0;
    for at in admitted.iter() {
        if *at - window_start < interval {
            in_window += 1;
        } else {
            window_start = *at;
            in_window = 1;
        }
        assert!(in_window <= 5, "{} admissions in one interval", in_window);
    }

    // 100 items at 5 per 50ms: the last batch opens 19 intervals after the first
    assert_eq!(*admitted.last().unwrap() - admitted[0], interval * 19);
}

#[tokio::test(start_paused = true)]
async fn test_evenly_spaced_admissions() {
    let throttle = create_throttle(5, 10, true).unwrap();
    assert_eq!(throttle.max_per_interval(), 1);
    assert_eq!(throttle.interval(), Duration::from_millis(2));

    let (admitted, subs) = record_admissions(&throttle, 100);
    futures::future::join_all(subs).await;

    let admitted = admitted.lock().unwrap();
    for pair in admitted.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(2) - JITTER, "gap {:?}", gap);
    }

    // Never a burst of 5 inside a 10ms window
    for (i, at) in admitted.iter().enumerate() {
        let in_window = admitted[i..].iter().take_while(|later| **later - *at < Duration::from_millis(10)).count();
        assert!(in_window <= 5);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_across_windows() {
    let throttle = create_throttle(2, 20, false).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let subs: Vec<_> = (0..20)
        .map(|i| {
            let order = Arc::clone(&order);
            throttle.submit(move || async move {
                order.lock().unwrap().push(i);
            })
        })
        .collect();
    futures::future::join_all(subs).await;

    assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

// =============================================================================
// Results and failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_results_resolve_in_submission_slots() {
    let throttle = create_throttle(3, 10, false).unwrap();
    let numbers = [1, 2, 3, 4, 5];

    let results = futures::future::join_all(numbers.iter().map(|&n| {
        throttle.submit(move || async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            n
        })
    }))
    .await;

    let results: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, numbers);
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_isolated_to_its_own_submission() {
    let throttle = create_throttle(2, 10, false).unwrap();

    let subs: Vec<_> = (0..6)
        .map(|i| {
            throttle.submit(move || async move {
                if i % 2 == 0 { Err(format!("item {} failed", i)) } else { Ok(i) }
            })
        })
        .collect();
    let results = futures::future::join_all(subs).await;

    for (i, result) in results.into_iter().enumerate() {
        let inner = result.unwrap();
        if i % 2 == 0 {
            assert_eq!(inner, Err(format!("item {} failed", i)));
        } else {
            assert_eq!(inner, Ok(i));
        }
    }
    assert_eq!(throttle.length(), 0);
    assert_eq!(throttle.stats().total_completed, 6);
}

#[test]
fn test_invalid_construction_fails_fast() {
    assert_eq!(create_throttle(0, 1000, false).unwrap_err(), ThrottleError::ZeroCapacity);
    assert!(matches!(
        create_throttle(1, 0, false).unwrap_err(),
        ThrottleError::ZeroInterval { .. }
    ));
    assert!(
        Throttle::new(ThrottleConfig {
            max_per_interval: 4,
            interval_ms: 0,
            evenly_spaced: true,
        })
        .unwrap_err()
        .is_config_error()
    );
}

// =============================================================================
// Real clock
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_thread_runtime_never_drains_early() {
    let throttle = create_throttle(2, 20, false).unwrap();
    let start = Instant::now();

    let (admitted, subs) = record_admissions(&throttle, 10);
    for result in futures::future::join_all(subs).await {
        result.unwrap();
    }

    // Windows open at 0, 20, 40, 60, 80ms
    let admitted = admitted.lock().unwrap();
    assert_eq!(admitted.len(), 10);
    let last = admitted.iter().max().unwrap();
    assert!(*last - start >= Duration::from_millis(80));
    assert_eq!(throttle.total(), 0);
}

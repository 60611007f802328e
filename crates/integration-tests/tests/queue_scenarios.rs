//! Queue Scenario Tests
//!
//! End-to-end queue behaviour through the public API: the documented
//! example scenarios, plus isolation between upstream queues.

use anifetch_core::application::RateLimitedQueue;
use anifetch_core::domain::retry_after::parse_retry_after;
use anifetch_core::domain::{QueueConfig, RequestError};
use anifetch_core::port::time_provider::mocks::FixedTimeProvider;
use anifetch_core::port::TimeProvider;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Log = Arc<Mutex<Vec<(String, Instant)>>>;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn new_queue(name: &str, min_interval_ms: u64, max_retries: u32) -> RateLimitedQueue {
    RateLimitedQueue::new(QueueConfig::new(name, ms(min_interval_ms), max_retries)).unwrap()
}

fn starts(log: &Log, label: &str) -> Vec<Instant> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(l, _)| l == label)
        .map(|(_, t)| *t)
        .collect()
}

/// Scenario 1: three instant operations come back in order, spaced by the interval
#[tokio::test(start_paused = true)]
async fn test_scenario_fifo_with_interval() {
    let queue = new_queue("scenario-1", 1000, 3);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let pending: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|value| {
            let log = log.clone();
            queue.submit(move || {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push((value.to_string(), Instant::now()));
                    Ok::<_, RequestError>(value)
                }
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(pending)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(results, vec!["A", "B", "C"]);

    let log = log.lock().unwrap();
    for pair in log.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= ms(1000));
    }

    println!("✅ Scenario 1: FIFO order with >= 1000ms between starts");
}

/// Scenario 2: `retry-after: 5` is honoured and blocks the next item
#[tokio::test(start_paused = true)]
async fn test_scenario_retry_after_header() {
    let queue = new_queue("scenario-2", 1000, 3);
    let clock = FixedTimeProvider::new(1_700_000_000_000);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let hint = parse_retry_after("5", clock.now_millis());
    assert_eq!(hint, Some(ms(5000)));

    let limited = {
        let log = log.clone();
        queue.submit(move || {
            let log = log.clone();
            let calls = calls.clone();
            async move {
                log.lock().unwrap().push(("limited".into(), Instant::now()));
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let mut error = RequestError::status(429, "Too Many Requests");
                    if let Some(hint) = hint {
                        error = error.with_retry_after(hint);
                    }
                    Err(error)
                } else {
                    Ok("done")
                }
            }
        })
    };
    let next = {
        let log = log.clone();
        queue.submit(move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(("next".into(), Instant::now()));
                Ok::<_, RequestError>("next")
            }
        })
    };

    let (limited, next) = tokio::join!(limited, next);
    assert_eq!(limited.unwrap(), "done");
    assert_eq!(next.unwrap(), "next");

    let limited_starts = starts(&log, "limited");
    let next_starts = starts(&log, "next");
    assert_eq!(limited_starts.len(), 2);
    assert!(limited_starts[1] - limited_starts[0] >= ms(5000));
    assert!(next_starts[0] >= limited_starts[0] + ms(5000));

    println!("✅ Scenario 2: Retry-After hold respected by the whole queue");
}

/// Scenario 3: persistent 503 with two retries means three attempts
#[tokio::test(start_paused = true)]
async fn test_scenario_server_error_exhausts_retries() {
    let queue = new_queue("scenario-3", 0, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let result = {
        let calls = calls.clone();
        queue
            .submit(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RequestError::status(503, "Service Unavailable"))
                }
            })
            .await
    };

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.unwrap_err().status_code(), Some(503));

    println!("✅ Scenario 3: 503 retried twice, then rejected");
}

/// Scenario 4: a plain error is terminal on the first failure
#[tokio::test(start_paused = true)]
async fn test_scenario_plain_error_is_terminal() {
    let queue = new_queue("scenario-4", 0, 3);
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let result = {
        let calls = calls.clone();
        queue
            .submit(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RequestError::Other("bad request".to_string()))
                }
            })
            .await
    };

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(result.unwrap_err().to_string(), "bad request");

    println!("✅ Scenario 4: plain error rejected without delay");
}

/// A rate-limit hold on one upstream queue never delays another
#[tokio::test(start_paused = true)]
async fn test_queues_are_independent() {
    let anilist = new_queue("anilist", 2000, 3);
    let jikan = new_queue("jikan", 1000, 3);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let held = {
        let log = log.clone();
        anilist.submit(move || {
            let log = log.clone();
            let calls = calls.clone();
            async move {
                log.lock().unwrap().push(("anilist".into(), Instant::now()));
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RequestError::status(429, "Too Many Requests")
                        .with_retry_after(Duration::from_secs(30)))
                } else {
                    Ok(())
                }
            }
        })
    };

    let started = Instant::now();
    let others: Vec<_> = (0..3)
        .map(|_| {
            let log = log.clone();
            jikan.submit(move || {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(("jikan".into(), Instant::now()));
                    Ok::<_, RequestError>(())
                }
            })
        })
        .collect();

    for result in futures::future::join_all(others).await {
        result.unwrap();
    }
    let jikan_done = started.elapsed();
    assert!(jikan.snapshot().pending == 0);
    assert!(
        anilist.snapshot().rate_limited_for.is_some(),
        "anilist should still be held"
    );

    held.await.unwrap();

    assert_eq!(jikan_done, ms(2000), "three starts spaced by 1000ms");
    let anilist_starts = starts(&log, "anilist");
    assert_eq!(anilist_starts[1] - anilist_starts[0], ms(30_000));

    println!("✅ Independent queues: rate-limit hold is per upstream");
}

/// Many tasks submitting concurrently still get exactly-once settlement
#[tokio::test(start_paused = true)]
async fn test_concurrent_submitters_each_settle_once() {
    let queue = new_queue("concurrent", 10, 0);
    let executed = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for i in 0..20u32 {
        let queue = queue.clone();
        let executed = executed.clone();
        handles.push(tokio::spawn(async move {
            queue
                .submit(move || {
                    let executed = executed.clone();
                    async move {
                        executed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, RequestError>(i)
                    }
                })
                .await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }
    values.sort_unstable();

    assert_eq!(values, (0..20).collect::<Vec<_>>());
    assert_eq!(executed.load(Ordering::SeqCst), 20);
    assert!(!queue.snapshot().is_processing);

    println!("✅ 20 concurrent submitters settled exactly once");
}

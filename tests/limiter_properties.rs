//! End-to-end properties of the admission engine through its public API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use turnstile::config::{LimiterConfig, TurnstileConfig};
use turnstile::ratelimit::{Algorithm, KeyMode, ManualClock, RateLimiter};

fn config(max_events: u64, window_ms: u64, algorithm: Algorithm) -> LimiterConfig {
    let mut config = LimiterConfig::default();
    for quota in [&mut config.token, &mut config.ip] {
        quota.max_events = max_events;
        quota.window_ms = window_ms;
        quota.algorithm = algorithm;
    }
    config.idle_timeout_secs = 30;
    config.eviction_interval_secs = 5;
    config.shards = 16;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_admit_exactly_max_events() {
    for algorithm in [
        Algorithm::TokenBucket,
        Algorithm::SlidingWindow,
        Algorithm::FixedWindow,
    ] {
        let max_events = 17;
        let callers = 200;
        // Frozen clock: nothing refills while the callers race.
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(
            RateLimiter::with_clock(&config(max_events, 1000, algorithm), clock).unwrap(),
        );
        let barrier = Arc::new(Barrier::new(callers));
        let admitted = Arc::new(AtomicU64::new(0));

        let tasks: Vec<_> = (0..callers)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                let admitted = admitted.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    if limiter.allow_by_token("hot-key").await.unwrap().allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            admitted.load(Ordering::SeqCst),
            max_events,
            "{algorithm:?} admitted the wrong number of racing callers"
        );
    }
}

#[test]
fn os_threads_share_one_state_per_key() {
    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(
        RateLimiter::with_clock(&config(10, 1000, Algorithm::SlidingWindow), clock).unwrap(),
    );
    let admitted = Arc::new(AtomicU64::new(0));

    let threads: Vec<_> = (0..16)
        .map(|_| {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    let decision =
                        tokio_test::block_on(limiter.allow_by_ip("198.51.100.20:1234")).unwrap();
                    if decision.allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 10);
    assert_eq!(limiter.key_count(KeyMode::Ip), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn busy_keys_do_not_affect_each_other() {
    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(
        RateLimiter::with_clock(&config(3, 1000, Algorithm::TokenBucket), clock).unwrap(),
    );

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let key = format!("client-{i}");
                let mut admitted = 0;
                for _ in 0..10 {
                    if limiter.allow_by_token(&key).await.unwrap().allowed {
                        admitted += 1;
                    }
                }
                admitted
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), 3);
    }
    assert_eq!(limiter.key_count(KeyMode::Token), 50);
}

#[tokio::test]
async fn worked_example_two_per_second() {
    let clock = Arc::new(ManualClock::new());
    let limiter =
        RateLimiter::with_clock(&config(2, 1000, Algorithm::SlidingWindow), clock.clone()).unwrap();

    assert!(limiter.allow_by_token("user").await.unwrap().allowed);
    clock.set(Duration::from_millis(100));
    assert!(limiter.allow_by_token("user").await.unwrap().allowed);

    clock.set(Duration::from_millis(200));
    let rejected = limiter.allow_by_token("user").await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.retry_after, Duration::from_millis(800));
    assert_eq!(rejected.retry_after_secs(), 1);

    clock.set(Duration::from_millis(1050));
    assert!(limiter.allow_by_token("user").await.unwrap().allowed);
}

#[tokio::test]
async fn waiting_retry_after_always_succeeds() {
    for algorithm in [
        Algorithm::TokenBucket,
        Algorithm::SlidingWindow,
        Algorithm::FixedWindow,
    ] {
        let clock = Arc::new(ManualClock::new());
        let limiter =
            RateLimiter::with_clock(&config(4, 1500, algorithm), clock.clone()).unwrap();

        for _ in 0..4 {
            limiter.allow_by_ip("203.0.113.5").await.unwrap();
        }
        let rejected = limiter.allow_by_ip("203.0.113.5").await.unwrap();
        assert!(!rejected.allowed);

        clock.advance(rejected.retry_after);
        assert!(
            limiter.allow_by_ip("203.0.113.5").await.unwrap().allowed,
            "{algorithm:?} still rejecting after retry_after"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn idle_keys_are_evicted_in_the_background() {
    let clock = Arc::new(ManualClock::new());
    let limiter =
        RateLimiter::start(&config(1, 60_000, Algorithm::SlidingWindow), clock.clone()).unwrap();

    assert!(limiter.allow_by_token("sleepy").await.unwrap().allowed);
    assert!(!limiter.allow_by_token("sleepy").await.unwrap().allowed);
    assert!(limiter.allow_by_token("active").await.unwrap().allowed);

    // Keep one key warm while the other goes idle past the 30s threshold.
    for _ in 0..8 {
        clock.advance(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(5)).await;
        limiter.allow_by_token("active").await.unwrap();
    }

    assert!(!limiter.is_tracked(KeyMode::Token, "sleepy"));
    assert!(limiter.is_tracked(KeyMode::Token, "active"));

    // A fresh state: full capacity even though the 60s window has not passed.
    assert!(limiter.allow_by_token("sleepy").await.unwrap().allowed);

    limiter.shutdown().await;
}

#[test]
fn limiter_builds_from_yaml_config() {
    let yaml = r#"
limiter:
  token:
    max_events: 1
    window_ms: 1000
    algorithm: fixed_window
  ip:
    max_events: 2
    window_ms: 1000
"#;
    let config = TurnstileConfig::from_yaml(yaml).unwrap();
    let limiter = RateLimiter::new(&config.limiter).unwrap();

    tokio_test::block_on(async {
        assert!(limiter.allow_by_token("t").await.unwrap().allowed);
        assert!(!limiter.allow_by_token("t").await.unwrap().allowed);
        assert!(limiter.allow_by_ip("10.9.8.7").await.unwrap().allowed);
        assert!(limiter.allow_by_ip("10.9.8.7").await.unwrap().allowed);
        assert!(!limiter.allow_by_ip("10.9.8.7").await.unwrap().allowed);
    });
}

//! Monitor-driven dynamic scaling: grow under saturation, shrink when idle.
//!
//! Timings here are deliberately loose; the monitor interval is 50ms and
//! every assertion leaves several ticks of slack.

mod common;

use common::Gate;
use foreman::{ThreadPool, ThreadPoolConfig};
use std::thread;
use std::time::Duration;

fn scaling_config() -> ThreadPoolConfig {
    ThreadPoolConfig {
        core_thread_count: 2,
        max_thread_count: 4,
        keep_alive_time: Duration::from_millis(100),
        monitor_interval: Duration::from_millis(50),
        enable_dynamic_scaling: true,
        ..ThreadPoolConfig::default()
    }
}

#[test]
fn grows_to_max_under_saturation_then_shrinks_to_core() {
    common::init_test_logging();

    let pool = ThreadPool::new(scaling_config());
    assert_eq!(pool.thread_count(), 2);

    // Saturate every worker the pool can ever have, and leave a backlog so
    // the grow rule keeps firing.
    let gate = Gate::new();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let gate = gate.clone();
        handles.push(pool.submit(move || gate.wait()).unwrap());
    }
    for _ in 0..3 {
        handles.push(pool.submit(|| {}).unwrap());
    }

    // One worker per tick: give the monitor several intervals.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.thread_count(), 4);

    // Release the blockers; everything drains, the extras go idle past
    // keep-alive and are reaped down to the core count.
    gate.open();
    for handle in handles {
        handle.wait().unwrap();
    }
    thread::sleep(Duration::from_millis(1000));
    assert_eq!(pool.thread_count(), 2);

    pool.shutdown();
}

#[test]
fn keep_alive_protects_core_workers() {
    common::init_test_logging();

    let pool = ThreadPool::new(scaling_config());
    assert_eq!(pool.thread_count(), 2);

    // A manually added worker starts reap-eligible and is shrunk away.
    pool.increase(1).unwrap();
    assert_eq!(pool.thread_count(), 3);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.thread_count(), 2);

    // Core workers are never reaped, however long they idle.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.thread_count(), 2);

    pool.shutdown();
}

#[test]
fn paused_pool_shrinks_but_never_grows() {
    common::init_test_logging();

    let pool = ThreadPool::new(scaling_config());
    pool.increase(2).unwrap();
    assert_eq!(pool.thread_count(), 4);

    pool.pause();

    // A backlog accumulates, but the grow rule is RUNNING-only; the idle
    // extras are still reaped.
    for _ in 0..2 {
        pool.submit(|| {}).unwrap();
    }

    thread::sleep(Duration::from_millis(400));
    assert_eq!(pool.thread_count(), 2);

    pool.shutdown();
}

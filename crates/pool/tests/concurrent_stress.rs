//! Concurrent stress: many tasks contending for a small blocking pool

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::TestFactory;
use nebula_pool::{Pool, PoolConfig, ValidatingPool};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strict_capacity_holds_under_contention() {
    common::init_tracing();
    let max = 4;
    let pool = Pool::new(
        TestFactory::new(),
        PoolConfig::new(max).with_blocking(Duration::from_secs(10)),
    );
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        tasks.spawn(async move {
            for _ in 0..20 {
                let handle = pool.acquire().await.expect("acquire within timeout");
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_use.fetch_sub(1, Ordering::SeqCst);
                handle.release().await;
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked");
    }

    assert!(peak.load(Ordering::SeqCst) <= max);
    assert!(pool.factory().created() as usize <= max);
    let stats = pool.stats();
    assert_eq!(stats.acquisitions, 32 * 20);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_handles_all_find_their_way_back() {
    let pool = Pool::new(
        TestFactory::new(),
        PoolConfig::new(2).with_blocking(Duration::from_secs(10)),
    );

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let pool = pool.clone();
        tasks.spawn(async move {
            for _ in 0..10 {
                let handle = pool.acquire().await.expect("acquire within timeout");
                drop(handle);
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().checked_out, 0);
    assert!(pool.size() <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn validating_pool_under_contention_never_hands_out_rejects() {
    let pool = Pool::new(
        TestFactory::new(),
        PoolConfig::new(3).with_blocking(Duration::from_secs(10)),
    );
    // Every third resource is bad.
    let validating = Arc::new(ValidatingPool::new(pool, |serial: &u64| serial % 3 != 2));

    let mut tasks = JoinSet::new();
    for _ in 0..12 {
        let validating = Arc::clone(&validating);
        tasks.spawn(async move {
            for _ in 0..10 {
                let handle = validating.acquire().await.expect("acquire within timeout");
                assert_ne!(*handle % 3, 2);
                handle.release().await;
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked");
    }

    assert!(validating.size() <= 3);
}

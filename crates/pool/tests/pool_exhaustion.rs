//! Capacity tests: strict exhaustion, soft overshoot, unbounded pools

mod common;

use common::TestFactory;
use nebula_pool::{Error, Pool, PoolConfig};

#[tokio::test]
async fn strict_non_blocking_pool_fails_fast_when_full() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(2).non_blocking());

    let r1 = pool.acquire().await.expect("first acquire should succeed");
    let _r2 = pool.acquire().await.expect("second acquire should succeed");

    let err = pool.acquire().await.unwrap_err();
    assert!(
        matches!(err, Error::Exhausted { size: 2, max: 2, .. }),
        "expected Exhausted, got {err:?}"
    );
    assert!(err.is_retryable());
    assert_eq!(err.pool(), "test");
    assert_eq!(pool.size(), 2);

    // Releasing one frees it for the next caller without building another.
    r1.release().await;
    let r3 = pool.acquire().await.expect("acquire after release should succeed");
    assert_eq!(*r3, 0);
    assert_eq!(pool.factory().created(), 2);
}

#[tokio::test]
async fn most_recently_released_resource_is_reused_first() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(3).non_blocking());

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let (a_id, b_id) = (a.id(), b.id());
    a.release().await;
    b.release().await;

    let next = pool.acquire().await.unwrap();
    assert_eq!(next.id(), b_id);
    let after = pool.acquire().await.unwrap();
    assert_eq!(after.id(), a_id);
    assert_eq!(pool.ready_count(), 0);
}

#[tokio::test]
async fn soft_pool_overshoots_and_sheds_surplus_on_release() {
    let config = PoolConfig::new(1).with_max_strict(false).non_blocking();
    let pool = Pool::new(TestFactory::new(), config);

    let held = vec![
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
    ];
    assert_eq!(pool.size(), 3, "soft capacity must not refuse callers");

    for handle in held {
        handle.release().await;
    }

    assert_eq!(pool.size(), 1);
    assert_eq!(pool.ready_count(), 1);
    assert_eq!(pool.factory().destroyed(), vec![0, 1]);
    assert_eq!(pool.stats().destroyed, 2);
}

#[tokio::test]
async fn unbounded_pool_never_refuses() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::unbounded());

    let mut held = Vec::new();
    for _ in 0..20 {
        held.push(pool.acquire().await.expect("unbounded acquire"));
    }
    assert_eq!(pool.size(), 20);

    for handle in held {
        handle.release().await;
    }
    assert_eq!(pool.ready_count(), 20);
    assert!(pool.factory().destroyed().is_empty());
}

#[tokio::test]
async fn exhausted_pool_recovers_after_discard() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(1).non_blocking());

    let only = pool.acquire().await.unwrap();
    assert!(pool.acquire().await.is_err());

    only.discard().await;
    assert_eq!(pool.size(), 0);

    let fresh = pool.acquire().await.expect("slot freed by discard");
    assert_eq!(*fresh, 1);
}

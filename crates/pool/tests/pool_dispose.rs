//! Disposal: ready resources destroyed once, late releases destroyed

mod common;

use std::time::Duration;

use common::{TestFactory, settle};
use nebula_pool::{Error, Pool, PoolConfig};

#[tokio::test]
async fn dispose_destroys_each_resource_exactly_once() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(3).non_blocking());
    let r0 = pool.acquire().await.unwrap();
    let r1 = pool.acquire().await.unwrap();
    let r2 = pool.acquire().await.unwrap();
    r0.release().await;
    r1.release().await;

    pool.dispose().await;
    assert!(pool.is_disposed());
    assert_eq!(pool.size(), 1, "the checked-out resource is still live");

    let mut destroyed = pool.factory().destroyed();
    destroyed.sort_unstable();
    assert_eq!(destroyed, vec![0, 1]);

    // Second dispose is a no-op.
    pool.dispose().await;
    assert_eq!(pool.factory().destroyed().len(), 2);

    r2.release().await;
    assert_eq!(pool.size(), 0);
    let mut destroyed = pool.factory().destroyed();
    destroyed.sort_unstable();
    assert_eq!(destroyed, vec![0, 1, 2]);
    assert_eq!(pool.stats().destroyed, 3);
}

#[tokio::test]
async fn acquire_after_dispose_fails() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(3));
    pool.dispose().await;

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Disposed { .. }), "got {err:?}");
    assert!(!err.is_retryable());
    assert_eq!(pool.factory().created(), 0);
}

#[tokio::test]
async fn dropped_handle_after_dispose_is_destroyed() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(1));
    let handle = pool.acquire().await.unwrap();

    pool.dispose().await;
    drop(handle);
    settle().await;

    assert_eq!(pool.factory().destroyed(), vec![0]);
    assert_eq!(pool.size(), 0);
}

#[tokio::test(start_paused = true)]
async fn construction_finishing_after_dispose_is_destroyed() {
    let pool = Pool::new(
        TestFactory::with_create_delay(Duration::from_millis(50)),
        PoolConfig::new(2),
    );

    let acquire = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|h| h.id()) }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.dispose().await;

    let err = acquire.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Disposed { .. }), "got {err:?}");
    assert_eq!(pool.factory().destroyed(), vec![0]);
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.stats().pending, 0);
}

#[tokio::test]
async fn dispose_through_a_clone_affects_every_clone() {
    let pool = Pool::new(TestFactory::new(), PoolConfig::new(2));
    let other = pool.clone();

    other.dispose().await;
    assert!(pool.is_disposed());
    assert!(pool.acquire().await.is_err());
}

//! Shared test factory.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::Factory;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
#[error("test factory failure: {0}")]
pub struct TestError(pub &'static str);

/// Factory producing increasing serial numbers and recording every call.
#[derive(Default)]
pub struct TestFactory {
    next: AtomicU64,
    recycled: AtomicUsize,
    destroyed: Mutex<Vec<u64>>,
    fail_create: AtomicBool,
    fail_recycle: AtomicBool,
    fail_destroy: AtomicBool,
    create_delay: Option<Duration>,
    recycle_delay: Option<Duration>,
    destroy_delay: Option<Duration>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create` take `delay`.
    pub fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every `recycle` take `delay`.
    pub fn slow_recycle(mut self, delay: Duration) -> Self {
        self.recycle_delay = Some(delay);
        self
    }

    /// Make every `destroy` take `delay`; the call is recorded once it
    /// completes.
    pub fn slow_destroy(mut self, delay: Duration) -> Self {
        self.destroy_delay = Some(delay);
        self
    }

    pub fn created(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    pub fn recycled(&self) -> usize {
        self.recycled.load(Ordering::SeqCst)
    }

    /// Serials passed to `destroy`, in call order.
    pub fn destroyed(&self) -> Vec<u64> {
        self.destroyed.lock().clone()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_recycle(&self, fail: bool) {
        self.fail_recycle.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Factory for TestFactory {
    type Resource = u64;
    type Error = TestError;

    fn describe(&self) -> String {
        "test".to_string()
    }

    async fn create(&self) -> Result<u64, TestError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TestError("create"));
        }
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    async fn recycle(&self, _resource: &mut u64) -> Result<(), TestError> {
        if let Some(delay) = self.recycle_delay {
            tokio::time::sleep(delay).await;
        }
        self.recycled.fetch_add(1, Ordering::SeqCst);
        if self.fail_recycle.load(Ordering::SeqCst) {
            return Err(TestError("recycle"));
        }
        Ok(())
    }

    async fn destroy(&self, resource: u64) -> Result<(), TestError> {
        if let Some(delay) = self.destroy_delay {
            tokio::time::sleep(delay).await;
        }
        self.destroyed.lock().push(resource);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(TestError("destroy"));
        }
        Ok(())
    }
}

/// Install a test-writer subscriber so pool logs show up on failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let handles released from `Drop` finish returning to the pool.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

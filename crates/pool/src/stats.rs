//! Pool statistics and checkout tracing records.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Snapshot of a pool's accounting and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live resources (checked out + ready).
    pub size: usize,
    /// Resources in the fresh generation.
    pub fresh: usize,
    /// Resources in the aged generation.
    pub aged: usize,
    /// Resources currently held by callers.
    pub checked_out: usize,
    /// Constructions in flight.
    pub pending: usize,
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Releases back to the pool.
    pub releases: u64,
    /// Times a caller had to wait for a full pool.
    pub blocks: u64,
    /// Blocked callers that gave up.
    pub timeouts: u64,
    /// Resources built by the factory.
    pub created: u64,
    /// Resources permanently removed.
    pub destroyed: u64,
}

impl PoolStats {
    /// Resources ready to be handed out.
    #[must_use]
    pub fn ready(&self) -> usize {
        self.fresh + self.aged
    }
}

/// An outstanding checkout recorded when tracing is enabled.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// Id of the checked-out resource.
    pub id: u64,
    /// Name of the thread that acquired it, if it had one.
    pub thread: Option<String>,
    /// When it was acquired.
    pub acquired_at: Instant,
    /// Where it was acquired from. Only resolved when backtraces are enabled
    /// through `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`.
    pub backtrace: Arc<Backtrace>,
}

impl Checkout {
    pub(crate) fn capture(id: u64) -> Self {
        Self {
            id,
            thread: std::thread::current().name().map(str::to_owned),
            acquired_at: Instant::now(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// How long the resource has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

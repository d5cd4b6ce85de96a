//! Error types for pool operations
use std::time::Duration;

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a [`Factory`](crate::Factory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to callers of `acquire`.
///
/// A caller either receives a fully constructed resource or exactly one of
/// these variants; a partially initialised resource is never handed out.
#[derive(Error, Debug)]
pub enum Error {
    /// The factory failed to build a new resource. Pool state is unaffected.
    #[error("Failed to construct a resource for pool '{pool}': {source}")]
    Construction {
        /// Description of the pool's factory
        pool: String,
        /// The factory's error
        #[source]
        source: BoxError,
    },

    /// A strict, non-blocking pool is at capacity.
    #[error("Pool '{pool}' exhausted: {size}/{max} resources in use")]
    Exhausted {
        /// Description of the pool's factory
        pool: String,
        /// Live resources at the time of the call
        size: usize,
        /// Configured capacity
        max: usize,
    },

    /// A blocking pool did not free a resource within `block_timeout`, or
    /// the caller cancelled the wait.
    #[error("Timed out after {}ms waiting for a resource from pool '{pool}'", .waited.as_millis())]
    Timeout {
        /// Description of the pool's factory
        pool: String,
        /// How long the caller waited
        waited: Duration,
    },

    /// The pool has been disposed.
    #[error("Pool '{pool}' has been disposed")]
    Disposed {
        /// Description of the pool's factory
        pool: String,
    },
}

impl Error {
    pub(crate) fn construction<E>(pool: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Construction {
            pool: pool.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn disposed(pool: impl Into<String>) -> Self {
        Self::Disposed { pool: pool.into() }
    }

    pub(crate) fn timeout(pool: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            pool: pool.into(),
            waited,
        }
    }

    /// Check if retrying the same call later might succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Timeout { .. })
    }

    /// Description of the pool that produced this error
    #[must_use]
    pub fn pool(&self) -> &str {
        match self {
            Self::Construction { pool, .. }
            | Self::Exhausted { pool, .. }
            | Self::Timeout { pool, .. }
            | Self::Disposed { pool } => pool,
        }
    }
}

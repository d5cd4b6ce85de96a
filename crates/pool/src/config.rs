//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Capacity, blocking and trimming policy of a [`Pool`](crate::Pool).
///
/// With the `serde` feature durations are read and written as humantime
/// strings (`"250ms"`, `"1m 30s"`), and missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of live resources; `0` means unbounded.
    pub max_size: usize,
    /// Treat `max_size` as a hard ceiling. When false the pool may grow past
    /// it under load and sheds the surplus as resources are released.
    pub max_strict: bool,
    /// Make callers wait for a release when a strict pool is full instead of
    /// failing with [`Error::Exhausted`](crate::Error::Exhausted).
    pub blocking: bool,
    /// Longest time a blocked caller waits; zero waits indefinitely.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub block_timeout: Duration,
    /// Minimum interval between implicit trims; zero disables them.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub trim_interval: Duration,
    /// Record who holds each checked-out resource.
    pub trace: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 3,
            max_strict: true,
            blocking: true,
            block_timeout: Duration::ZERO,
            trim_interval: Duration::from_secs(60),
            trace: false,
        }
    }
}

impl PoolConfig {
    /// Strict pool of `max_size` resources with the remaining defaults.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Unbounded, non-blocking pool that never trims.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_size: 0,
            max_strict: false,
            blocking: false,
            block_timeout: Duration::ZERO,
            trim_interval: Duration::ZERO,
            trace: false,
        }
    }

    /// Set the capacity.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set whether the capacity is a hard ceiling.
    pub fn with_max_strict(mut self, strict: bool) -> Self {
        self.max_strict = strict;
        self
    }

    /// Block for at most `timeout` (zero = forever) when the pool is full.
    pub fn with_blocking(mut self, timeout: Duration) -> Self {
        self.blocking = true;
        self.block_timeout = timeout;
        self
    }

    /// Fail immediately when the pool is full.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self.block_timeout = Duration::ZERO;
        self
    }

    /// Set the implicit trim interval (zero disables it).
    pub fn with_trim_interval(mut self, interval: Duration) -> Self {
        self.trim_interval = interval;
        self
    }

    /// Enable or disable checkout tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Capacity as an upper bound, `None` when unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        (self.max_size > 0).then_some(self.max_size)
    }

    /// Whether a full pool ever makes callers wait.
    #[must_use]
    pub fn waits_when_full(&self) -> bool {
        self.blocking && self.max_strict && self.max_size > 0
    }
}

//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by [`Pool`](crate::Pool)
//! operations and an [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool operations.
///
/// Every variant carries the `pool` description of the emitting pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The factory built a new resource.
    Created {
        /// The pool description.
        pool: String,
        /// Id of the new resource.
        id: u64,
    },
    /// A resource was handed to a caller.
    Acquired {
        /// The pool description.
        pool: String,
        /// Id of the resource.
        id: u64,
        /// Time spent inside `acquire`, including any wait.
        waited: Duration,
    },
    /// A caller released a resource.
    Released {
        /// The pool description.
        pool: String,
        /// Id of the resource.
        id: u64,
        /// How long the caller held it.
        held: Duration,
    },
    /// A caller started waiting for a full pool.
    Blocked {
        /// The pool description.
        pool: String,
    },
    /// A non-blocking caller was rejected by a full pool.
    Exhausted {
        /// The pool description.
        pool: String,
        /// Live resources at the time.
        size: usize,
    },
    /// A blocked caller gave up.
    TimedOut {
        /// The pool description.
        pool: String,
        /// How long it waited.
        waited: Duration,
    },
    /// A resource was permanently removed.
    Destroyed {
        /// The pool description.
        pool: String,
        /// Id of the resource.
        id: u64,
        /// Why it was removed.
        reason: DestroyReason,
    },
    /// A trim cycle ran.
    Trimmed {
        /// The pool description.
        pool: String,
        /// Resources destroyed from the aged generation.
        destroyed: usize,
        /// Resources moved from the fresh into the aged generation.
        aged: usize,
    },
    /// The pool was disposed.
    Disposed {
        /// The pool description.
        pool: String,
        /// Resources still checked out at disposal.
        outstanding: usize,
    },
}

impl PoolEvent {
    /// Description of the pool that emitted the event.
    #[must_use]
    pub fn pool(&self) -> &str {
        match self {
            Self::Created { pool, .. }
            | Self::Acquired { pool, .. }
            | Self::Released { pool, .. }
            | Self::Blocked { pool }
            | Self::Exhausted { pool, .. }
            | Self::TimedOut { pool, .. }
            | Self::Destroyed { pool, .. }
            | Self::Trimmed { pool, .. }
            | Self::Disposed { pool, .. } => pool,
        }
    }
}

// ---------------------------------------------------------------------------
// DestroyReason
// ---------------------------------------------------------------------------

/// Reason a resource was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// It sat in the aged generation through a trim.
    Trimmed,
    /// It was released while a soft pool was above capacity.
    Surplus,
    /// The pool was disposed.
    Disposed,
    /// A validator rejected it.
    ValidationFailed,
    /// The factory failed to recycle it.
    RecycleFailed,
    /// The caller discarded it explicitly.
    Discarded,
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Trimmed => "trimmed",
            Self::Surplus => "surplus",
            Self::Disposed => "disposed",
            Self::ValidationFailed => "validation_failed",
            Self::RecycleFailed => "recycle_failed",
            Self::Discarded => "discarded",
        };
        f.write_str(reason)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if nobody listens or the channel is full,
/// events are dropped and the pool is never slowed down.
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus buffering up to `buffer_size` events per
    /// subscriber.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

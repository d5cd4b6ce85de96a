//! Lock-protected bookkeeping of a pool.
//!
//! Everything here is synchronous and runs under the pool mutex; the async
//! layer in [`super`] decides what to do with the entries handed back.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::events::DestroyReason;
use crate::stats::{Checkout, PoolStats};

/// A pooled resource together with its pool-assigned id.
pub(crate) struct Entry<T> {
    pub(crate) id: u64,
    pub(crate) instance: T,
}

/// Result of a trim rotation.
pub(crate) struct Rotation<T> {
    /// Entries evicted from the aged generation, already uncounted.
    pub(crate) expired: Vec<Entry<T>>,
    /// Entries moved from fresh to aged.
    pub(crate) aged: usize,
}

pub(crate) struct State<T> {
    /// Live resources: checked out + fresh + aged.
    total: usize,
    /// Reservations for constructions in flight.
    pending: usize,
    /// LIFO, most recently released last.
    fresh: Vec<Entry<T>>,
    aged: Vec<Entry<T>>,
    last_trim: Instant,
    disposed: bool,
    next_id: u64,
    checkouts: HashMap<u64, Checkout>,
    acquisitions: u64,
    releases: u64,
    blocks: u64,
    timeouts: u64,
    created: u64,
    destroyed: u64,
}

impl<T> State<T> {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            total: 0,
            pending: 0,
            fresh: Vec::new(),
            aged: Vec::new(),
            last_trim: now,
            disposed: false,
            next_id: 0,
            checkouts: HashMap::new(),
            acquisitions: 0,
            releases: 0,
            blocks: 0,
            timeouts: 0,
            created: 0,
            destroyed: 0,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn ready(&self) -> usize {
        self.fresh.len() + self.aged.len()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    // -- trimming ----------------------------------------------------------

    pub(crate) fn trim_due(&self, interval: Duration, now: Instant) -> bool {
        !interval.is_zero() && now.saturating_duration_since(self.last_trim) >= interval
    }

    /// Evict the aged generation and demote the fresh one in its place.
    pub(crate) fn rotate(&mut self, now: Instant) -> Rotation<T> {
        let expired = std::mem::take(&mut self.aged);
        self.total -= expired.len();
        self.destroyed += expired.len() as u64;

        // `aged` is empty now; swapping keeps both allocations around.
        std::mem::swap(&mut self.fresh, &mut self.aged);
        self.last_trim = now;

        Rotation {
            expired,
            aged: self.aged.len(),
        }
    }

    // -- checkout ----------------------------------------------------------

    /// Pop the most recently released resource, preferring the fresh
    /// generation.
    pub(crate) fn take_ready(&mut self) -> Option<Entry<T>> {
        self.fresh.pop().or_else(|| self.aged.pop())
    }

    /// Whether the capacity policy allows building another resource.
    pub(crate) fn has_room(&self, config: &PoolConfig) -> bool {
        !config.max_strict || config.max_size == 0 || self.total + self.pending < config.max_size
    }

    pub(crate) fn reserve(&mut self) {
        self.pending += 1;
    }

    pub(crate) fn unreserve(&mut self) {
        debug_assert!(self.pending > 0, "unbalanced reservation");
        self.pending -= 1;
    }

    /// Count a freshly built resource and assign it an id.
    pub(crate) fn admit(&mut self, instance: T) -> Entry<T> {
        self.total += 1;
        self.created += 1;
        let id = self.next_id;
        self.next_id += 1;
        Entry { id, instance }
    }

    pub(crate) fn check_out(&mut self, id: u64, trace: bool) {
        self.acquisitions += 1;
        if trace {
            self.checkouts.insert(id, Checkout::capture(id));
        }
    }

    pub(crate) fn record_block(&mut self) {
        self.blocks += 1;
    }

    pub(crate) fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    // -- check-in ----------------------------------------------------------

    /// Take back a released resource. Returns the entry when it has to be
    /// destroyed instead of pooled; it is already uncounted then.
    pub(crate) fn check_in(
        &mut self,
        entry: Entry<T>,
        config: &PoolConfig,
        recycled: bool,
    ) -> Option<(Entry<T>, DestroyReason)> {
        self.releases += 1;
        self.checkouts.remove(&entry.id);

        let reason = if self.disposed {
            Some(DestroyReason::Disposed)
        } else if !recycled {
            Some(DestroyReason::RecycleFailed)
        } else if config.max_size > 0 && self.total > config.max_size {
            Some(DestroyReason::Surplus)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.uncount();
                Some((entry, reason))
            }
            None => {
                self.fresh.push(entry);
                None
            }
        }
    }

    /// Forget a checked-out resource that is about to be destroyed.
    pub(crate) fn remove(&mut self, id: u64) {
        self.checkouts.remove(&id);
        self.uncount();
    }

    /// Forget a checked-out resource the caller keeps for itself.
    pub(crate) fn detach(&mut self, id: u64) {
        self.checkouts.remove(&id);
        debug_assert!(self.total > 0, "detach without a live resource");
        self.total -= 1;
    }

    fn uncount(&mut self) {
        debug_assert!(self.total > 0, "destroying more resources than were created");
        self.total -= 1;
        self.destroyed += 1;
    }

    // -- disposal ----------------------------------------------------------

    /// Mark the pool disposed and hand back every ready entry, uncounted.
    /// Returns `None` if it was already disposed.
    pub(crate) fn dispose(&mut self) -> Option<Vec<Entry<T>>> {
        if self.disposed {
            return None;
        }
        self.disposed = true;

        let mut drained = std::mem::take(&mut self.fresh);
        drained.append(&mut self.aged);
        self.total -= drained.len();
        self.destroyed += drained.len() as u64;
        Some(drained)
    }

    // -- introspection -----------------------------------------------------

    pub(crate) fn checkouts(&self) -> Vec<Checkout> {
        let mut checkouts: Vec<_> = self.checkouts.values().cloned().collect();
        checkouts.sort_by_key(|c| c.id);
        checkouts
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.total,
            fresh: self.fresh.len(),
            aged: self.aged.len(),
            checked_out: self.total - self.ready(),
            pending: self.pending,
            acquisitions: self.acquisitions,
            releases: self.releases,
            blocks: self.blocks,
            timeouts: self.timeouts,
            created: self.created,
            destroyed: self.destroyed,
        }
    }
}

//! RAII handle for checked-out resources

use std::time::Duration;

use tokio::time::Instant;

use crate::events::DestroyReason;
use crate::factory::Factory;
use crate::pool::Pool;
use crate::pool::state::Entry;

/// A resource checked out of a [`Pool`].
///
/// Dereferences to the resource. Hand it back with [`release`](Self::release);
/// dropping the handle releases it too, from a task spawned on the current
/// tokio runtime.
pub struct Pooled<F: Factory> {
    entry: Option<Entry<F::Resource>>,
    pool: Pool<F>,
    acquired_at: Instant,
}

impl<F: Factory> Pooled<F> {
    pub(crate) fn new(entry: Entry<F::Resource>, pool: Pool<F>) -> Self {
        Self {
            entry: Some(entry),
            pool,
            acquired_at: Instant::now(),
        }
    }

    fn take(&mut self) -> Entry<F::Resource> {
        self.entry.take().expect("handle used after release")
    }

    /// Pool-assigned id of the resource, stable across checkouts.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry.as_ref().expect("handle used after release").id
    }

    /// How long this handle has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// The pool this resource belongs to.
    #[must_use]
    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    /// Return the resource to the pool, running the factory's recycle hook.
    pub async fn release(mut self) {
        let entry = self.take();
        self.pool.release_detached(entry, self.acquired_at).await;
    }

    /// Destroy the resource instead of returning it, e.g. after the caller
    /// saw it fail.
    pub async fn discard(self) {
        self.discard_with(DestroyReason::Discarded).await;
    }

    pub(crate) async fn discard_with(mut self, reason: DestroyReason) {
        let entry = self.take();
        self.pool.discard_entry(entry, reason).await;
    }

    /// Take the resource out of the pool for good.
    ///
    /// It no longer counts toward the pool's size and the pool will never
    /// destroy it.
    #[must_use]
    pub fn detach(mut self) -> F::Resource {
        let entry = self.take();
        self.pool.detach_entry(entry.id);
        entry.instance
    }
}

impl<F: Factory> std::ops::Deref for Pooled<F> {
    type Target = F::Resource;

    fn deref(&self) -> &F::Resource {
        &self.entry.as_ref().expect("handle used after release").instance
    }
}

impl<F: Factory> std::ops::DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut F::Resource {
        &mut self.entry.as_mut().expect("handle used after release").instance
    }
}

impl<F: Factory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release_in_background(entry, self.acquired_at);
        }
    }
}

impl<F> std::fmt::Debug for Pooled<F>
where
    F: Factory,
    F::Resource: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.entry.as_ref().map(|e| e.id))
            .field("resource", &self.entry.as_ref().map(|e| &e.instance))
            .field("held_for", &self.held_for())
            .finish()
    }
}

//! Pool decorator that health-checks resources before handing them out.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::DestroyReason;
use crate::factory::Factory;
use crate::handle::Pooled;
use crate::pool::Pool;

/// Decides whether a pooled resource is still usable.
///
/// Implemented for any `Fn(&T) -> bool`; implement it directly when the check
/// needs to do I/O (e.g. pinging a connection).
#[async_trait]
pub trait Validator<T: Sync>: Send + Sync + 'static {
    /// Return `false` to have the resource destroyed and replaced.
    async fn validate(&self, resource: &T) -> bool;
}

#[async_trait]
impl<T, V> Validator<T> for V
where
    T: Sync + 'static,
    V: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn validate(&self, resource: &T) -> bool {
        self(resource)
    }
}

/// A [`Pool`] whose `acquire` never returns a resource its validator rejects.
///
/// Validation runs outside the pool lock. Rejected resources are destroyed
/// and the acquire is retried; all retries share the deadline of the first
/// attempt, so a caller never waits longer than `block_timeout` in total.
pub struct ValidatingPool<F: Factory, V> {
    pool: Pool<F>,
    validator: V,
    skip_new: bool,
}

impl<F, V> ValidatingPool<F, V>
where
    F: Factory,
    V: Validator<F::Resource>,
{
    /// Wrap `pool`, checking every acquired resource with `validator`.
    pub fn new(pool: Pool<F>, validator: V) -> Self {
        Self {
            pool,
            validator,
            skip_new: false,
        }
    }

    /// Skip validation of resources built during the same acquire.
    pub fn skip_new(mut self, skip: bool) -> Self {
        self.skip_new = skip;
        self
    }

    /// Check out a resource that passed validation.
    pub async fn acquire(&self) -> Result<Pooled<F>> {
        let started = Instant::now();
        let deadline = self.pool.deadline(started);

        loop {
            let acquired = self.pool.checkout(started, deadline).await?;
            let handle = acquired.handle;

            if (acquired.created && self.skip_new) || self.validator.validate(&*handle).await {
                return Ok(handle);
            }

            debug!(
                pool = %self.pool.describe(),
                id = handle.id(),
                "removing resource that failed validation"
            );
            handle.discard_with(DestroyReason::ValidationFailed).await;

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(Error::timeout(self.pool.describe(), started.elapsed()));
            }
        }
    }

    /// The wrapped pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    /// Destroy ready resources and reject further acquires.
    pub async fn dispose(&self) {
        self.pool.dispose().await;
    }
}

impl<F: Factory, V> std::ops::Deref for ValidatingPool<F, V> {
    type Target = Pool<F>;

    fn deref(&self) -> &Pool<F> {
        &self.pool
    }
}

impl<F: Factory, V> std::fmt::Debug for ValidatingPool<F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatingPool")
            .field("pool", &self.pool)
            .field("skip_new", &self.skip_new)
            .finish()
    }
}

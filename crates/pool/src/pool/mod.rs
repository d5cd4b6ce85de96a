//! Resource-limiting pool with generational idle trimming.
//!
//! All bookkeeping happens under one `parking_lot::Mutex` per pool. Factory
//! calls (create, recycle, destroy) run outside it, as does every wait:
//! blocked callers park on a `tokio::sync::Notify` that releases, freed
//! capacity and disposal signal.

pub(crate) mod state;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::events::{DestroyReason, EventBus, PoolEvent};
use crate::factory::Factory;
use crate::handle::Pooled;
use crate::stats::{Checkout, PoolStats};

use state::{Entry, Rotation, State};

/// Shared state behind every clone of a [`Pool`].
struct Shared<F: Factory> {
    factory: F,
    name: String,
    config: PoolConfig,
    state: Mutex<State<F::Resource>>,
    /// Signalled on release, freed capacity and disposal.
    available: Notify,
    events: Option<Arc<EventBus>>,
}

/// A checked-out handle plus whether it was built by this very call.
pub(crate) struct Acquired<F: Factory> {
    pub(crate) handle: Pooled<F>,
    pub(crate) created: bool,
}

/// What a single locked pass over the state decided.
enum Step<T> {
    Ready(Entry<T>),
    Create,
    Exhausted(usize),
    Wait,
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// Capacity held for a construction in flight. Dropping it unsettled
/// (construction failed or the caller went away) hands the slot back.
struct Reservation<'a, F: Factory> {
    pool: &'a Pool<F>,
    armed: bool,
}

impl<'a, F: Factory> Reservation<'a, F> {
    fn new(pool: &'a Pool<F>) -> Self {
        Self { pool, armed: true }
    }

    /// Settle the reservation under the lock. Returns the admitted entry, or
    /// the instance back if the pool was disposed meanwhile.
    fn settle(
        mut self,
        state: &mut State<F::Resource>,
        instance: F::Resource,
    ) -> std::result::Result<Entry<F::Resource>, F::Resource> {
        self.armed = false;
        state.unreserve();
        if state.is_disposed() {
            return Err(instance);
        }
        let entry = state.admit(instance);
        state.check_out(entry.id, self.pool.shared.config.trace);
        Ok(entry)
    }
}

impl<F: Factory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.shared.state.lock().unreserve();
            self.pool.shared.available.notify_one();
        }
    }
}

// ---------------------------------------------------------------------------
// Pool<F>
// ---------------------------------------------------------------------------

/// Concurrency-safe pool of resources built by a [`Factory`].
///
/// Capacity is either strict (`max_size` is a hard ceiling, enforced before
/// construction) or soft (concurrent acquires may build past `max_size`; the
/// surplus is destroyed as it is released). A strict pool that is full either
/// fails fast or makes callers wait, depending on [`PoolConfig::blocking`].
/// Waiters are not served in FIFO order.
///
/// Idle resources are reclaimed with two generations instead of per-resource
/// timestamps: releases go to the *fresh* list, each trim destroys the *aged*
/// list and demotes the fresh one. A resource left idle through two trims is
/// destroyed; one that keeps being reused never ages.
pub struct Pool<F: Factory> {
    shared: Arc<Shared<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: Factory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: Factory> Pool<F> {
    /// Create a pool that builds resources with `factory`.
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self::build(factory, config, None)
    }

    /// Create a pool that reports lifecycle events on `events`.
    pub fn with_event_bus(factory: F, config: PoolConfig, events: Arc<EventBus>) -> Self {
        Self::build(factory, config, Some(events))
    }

    fn build(factory: F, config: PoolConfig, events: Option<Arc<EventBus>>) -> Self {
        let name = factory.describe();
        if config.blocking && !config.waits_when_full() {
            warn!(
                pool = %name,
                "blocking is enabled but the pool is never full; callers will not wait"
            );
        }
        debug!(
            pool = %name,
            max_size = config.max_size,
            max_strict = config.max_strict,
            blocking = config.blocking,
            "created pool"
        );
        Self {
            shared: Arc::new(Shared {
                factory,
                name,
                config,
                state: Mutex::new(State::new(Instant::now())),
                available: Notify::new(),
                events,
            }),
        }
    }

    // -- acquire -----------------------------------------------------------

    /// Check out a resource.
    ///
    /// Reuses the most recently released resource if there is one, builds a
    /// new one if capacity allows, and otherwise fails with
    /// [`Error::Exhausted`] or waits, up to `block_timeout`, for a release.
    ///
    /// Dropping the returned future at any point leaves the pool consistent.
    pub async fn acquire(&self) -> Result<Pooled<F>> {
        let started = Instant::now();
        self.checkout(started, self.deadline(started))
            .await
            .map(|acquired| acquired.handle)
    }

    /// Like [`acquire`](Self::acquire), but gives up with [`Error::Timeout`]
    /// once `cancel` fires.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<Pooled<F>> {
        let started = Instant::now();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(pool = %self.shared.name, "acquire cancelled");
                Err(self.timed_out(started))
            }
            result = self.acquire() => result,
        }
    }

    /// Deadline for a call started at `started`, `None` if it may wait
    /// forever (zero timeout, or one too large to represent).
    pub(crate) fn deadline(&self, started: Instant) -> Option<Instant> {
        let timeout = self.shared.config.block_timeout;
        if timeout.is_zero() {
            return None;
        }
        started.checked_add(timeout)
    }

    /// Count and report a caller that gave up waiting.
    fn timed_out(&self, started: Instant) -> Error {
        let shared = &self.shared;
        let waited = started.elapsed();
        shared.state.lock().record_timeout();
        self.emit(|| PoolEvent::TimedOut {
            pool: shared.name.clone(),
            waited,
        });
        Error::timeout(&shared.name, waited)
    }

    pub(crate) async fn checkout(
        &self,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<Acquired<F>> {
        let shared = &self.shared;
        let mut blocked = false;
        let mut expired = false;

        loop {
            // Register interest before looking at the state so a release
            // between the check and the wait is not lost.
            let notified = shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (step, rotation) = {
                let mut state = shared.state.lock();
                if state.is_disposed() {
                    return Err(Error::disposed(&shared.name));
                }

                let now = Instant::now();
                let rotation = state
                    .trim_due(shared.config.trim_interval, now)
                    .then(|| state.rotate(now));

                let step = if let Some(entry) = state.take_ready() {
                    state.check_out(entry.id, shared.config.trace);
                    Step::Ready(entry)
                } else if state.has_room(&shared.config) {
                    state.reserve();
                    Step::Create
                } else if !shared.config.blocking {
                    Step::Exhausted(state.total())
                } else {
                    if !blocked {
                        state.record_block();
                    }
                    Step::Wait
                };
                (step, rotation)
            };

            match step {
                Step::Ready(entry) => {
                    let handle = Pooled::new(entry, self.clone());
                    if let Some(rotation) = rotation {
                        self.finish_trim(rotation).await;
                    }
                    self.acquired(&handle, started);
                    return Ok(Acquired {
                        handle,
                        created: false,
                    });
                }
                Step::Create => {
                    let reservation = Reservation::new(self);
                    if let Some(rotation) = rotation {
                        self.finish_trim(rotation).await;
                    }
                    let handle = self.construct(reservation).await?;
                    self.acquired(&handle, started);
                    return Ok(Acquired {
                        handle,
                        created: true,
                    });
                }
                Step::Exhausted(size) => {
                    if let Some(rotation) = rotation {
                        self.finish_trim(rotation).await;
                    }
                    debug!(pool = %shared.name, size, "pool exhausted");
                    self.emit(|| PoolEvent::Exhausted {
                        pool: shared.name.clone(),
                        size,
                    });
                    return Err(Error::Exhausted {
                        pool: shared.name.clone(),
                        size,
                        max: shared.config.max_size,
                    });
                }
                Step::Wait => {
                    if let Some(rotation) = rotation {
                        self.finish_trim(rotation).await;
                    }
                    if expired {
                        debug!(
                            pool = %shared.name,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "timed out waiting for a resource"
                        );
                        return Err(self.timed_out(started));
                    }
                    if !blocked {
                        blocked = true;
                        debug!(pool = %shared.name, "blocking until a resource is released");
                        self.emit(|| PoolEvent::Blocked {
                            pool: shared.name.clone(),
                        });
                    }

                    let woken = match deadline {
                        Some(deadline) => tokio::time::timeout_at(deadline, notified)
                            .await
                            .is_ok(),
                        None => {
                            notified.await;
                            true
                        }
                    };

                    // Woken: another caller may have won the race, go again.
                    // Deadline passed: one last look, a release may have
                    // landed together with the timer.
                    expired = !woken;
                }
            }
        }
    }

    /// Build a resource for a reserved slot.
    async fn construct(&self, reservation: Reservation<'_, F>) -> Result<Pooled<F>> {
        let shared = &self.shared;

        let instance = match shared.factory.create().await {
            Ok(instance) => instance,
            Err(e) => {
                debug!(pool = %shared.name, error = %e, "factory failed to create a resource");
                // Dropping the reservation returns the slot.
                drop(reservation);
                return Err(Error::construction(&shared.name, e));
            }
        };

        let settled = {
            let mut state = shared.state.lock();
            reservation.settle(&mut state, instance)
        };

        match settled {
            Ok(entry) => {
                debug!(pool = %shared.name, id = entry.id, "created a new resource");
                self.emit(|| PoolEvent::Created {
                    pool: shared.name.clone(),
                    id: entry.id,
                });
                Ok(Pooled::new(entry, self.clone()))
            }
            Err(instance) => {
                debug!(pool = %shared.name, "pool disposed during construction");
                let pool = self.clone();
                self.run_detached(async move {
                    if let Err(e) = pool.shared.factory.destroy(instance).await {
                        warn!(pool = %pool.shared.name, error = %e, "failed to destroy resource");
                    }
                })
                .await;
                Err(Error::disposed(&shared.name))
            }
        }
    }

    fn acquired(&self, handle: &Pooled<F>, started: Instant) {
        let shared = &self.shared;
        let id = handle.id();
        trace!(pool = %shared.name, id, "acquired resource");
        self.emit(|| PoolEvent::Acquired {
            pool: shared.name.clone(),
            id,
            waited: started.elapsed(),
        });
    }

    // -- release -----------------------------------------------------------

    /// Release from [`Pooled::release`]. Completes even if the caller's
    /// future is dropped while recycling.
    pub(crate) async fn release_detached(&self, entry: Entry<F::Resource>, acquired_at: Instant) {
        let pool = self.clone();
        self.run_detached(async move { pool.release_entry(entry, acquired_at).await })
            .await;
    }

    async fn release_entry(&self, mut entry: Entry<F::Resource>, acquired_at: Instant) {
        let shared = &self.shared;
        let recycled = match shared.factory.recycle(&mut entry.instance).await {
            Ok(()) => true,
            Err(e) => {
                warn!(pool = %shared.name, id = entry.id, error = %e, "failed to recycle resource");
                false
            }
        };

        if let Some((entry, reason)) = self.check_in(entry, acquired_at, recycled) {
            self.destroy(entry, reason).await;
        }
    }

    /// Release from a handle's `Drop`.
    pub(crate) fn release_in_background(&self, entry: Entry<F::Resource>, acquired_at: Instant) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = self.clone();
                drop(runtime.spawn(async move {
                    pool.release_entry(entry, acquired_at).await;
                }));
            }
            Err(_) => {
                // No runtime to run the factory on: skip recycling, and drop
                // anything that should have been destroyed.
                if let Some((entry, reason)) = self.check_in(entry, acquired_at, true) {
                    warn!(
                        pool = %self.shared.name,
                        id = entry.id,
                        %reason,
                        "released outside a tokio runtime; dropping resource without destroying it"
                    );
                }
            }
        }
    }

    fn check_in(
        &self,
        entry: Entry<F::Resource>,
        acquired_at: Instant,
        recycled: bool,
    ) -> Option<(Entry<F::Resource>, DestroyReason)> {
        let shared = &self.shared;
        let id = entry.id;
        let outcome = shared.state.lock().check_in(entry, &shared.config, recycled);

        if shared.config.blocking {
            shared.available.notify_one();
        }

        trace!(pool = %shared.name, id, pooled = outcome.is_none(), "released resource");
        self.emit(|| PoolEvent::Released {
            pool: shared.name.clone(),
            id,
            held: acquired_at.elapsed(),
        });
        outcome
    }

    pub(crate) async fn discard_entry(&self, entry: Entry<F::Resource>, reason: DestroyReason) {
        let shared = &self.shared;
        shared.state.lock().remove(entry.id);
        if shared.config.blocking {
            shared.available.notify_one();
        }
        self.destroy_detached(vec![entry], reason).await;
    }

    pub(crate) fn detach_entry(&self, id: u64) {
        let shared = &self.shared;
        shared.state.lock().detach(id);
        if shared.config.blocking {
            shared.available.notify_one();
        }
        debug!(pool = %shared.name, id, "detached resource from pool");
    }

    /// Destroy entries that are already uncounted on a spawned task, so that
    /// dropping the caller's future midway does not skip any of them.
    async fn destroy_detached(&self, entries: Vec<Entry<F::Resource>>, reason: DestroyReason) {
        if entries.is_empty() {
            return;
        }
        let pool = self.clone();
        self.run_detached(async move {
            for entry in entries {
                pool.destroy(entry, reason).await;
            }
        })
        .await;
    }

    /// Run `task` to completion on the runtime and wait for it. The task
    /// keeps running if the caller goes away.
    async fn run_detached(&self, task: impl Future<Output = ()> + Send + 'static) {
        if let Err(e) = tokio::spawn(task).await {
            warn!(pool = %self.shared.name, error = %e, "pool task failed");
        }
    }

    /// Run the factory's destroy for an entry that is already uncounted.
    async fn destroy(&self, entry: Entry<F::Resource>, reason: DestroyReason) {
        let shared = &self.shared;
        let id = entry.id;
        if let Err(e) = shared.factory.destroy(entry.instance).await {
            warn!(pool = %shared.name, id, %reason, error = %e, "failed to destroy resource");
        } else {
            debug!(pool = %shared.name, id, %reason, "destroyed resource");
        }
        self.emit(|| PoolEvent::Destroyed {
            pool: shared.name.clone(),
            id,
            reason,
        });
    }

    // -- trimming ----------------------------------------------------------

    /// Destroy the aged generation and demote the fresh one.
    ///
    /// Called implicitly by `acquire` once `trim_interval` has passed; call
    /// it directly (or use [`spawn_trimmer`](Self::spawn_trimmer)) when the
    /// pool sees too few acquires for that to happen. Returns how many
    /// resources were destroyed.
    pub async fn trim(&self) -> usize {
        let rotation = self.shared.state.lock().rotate(Instant::now());
        self.finish_trim(rotation).await
    }

    /// Trim only if `trim_interval` has passed since the last trim.
    async fn trim_if_due(&self) -> usize {
        let rotation = {
            let mut state = self.shared.state.lock();
            let now = Instant::now();
            state
                .trim_due(self.shared.config.trim_interval, now)
                .then(|| state.rotate(now))
        };
        match rotation {
            Some(rotation) => self.finish_trim(rotation).await,
            None => 0,
        }
    }

    async fn finish_trim(&self, rotation: Rotation<F::Resource>) -> usize {
        let shared = &self.shared;
        let destroyed = rotation.expired.len();
        if destroyed > 0 {
            // Capacity was freed.
            shared.available.notify_waiters();
        }
        debug!(
            pool = %shared.name,
            destroyed,
            aged = rotation.aged,
            "trimmed idle resources"
        );
        self.destroy_detached(rotation.expired, DestroyReason::Trimmed)
            .await;
        self.emit(|| PoolEvent::Trimmed {
            pool: shared.name.clone(),
            destroyed,
            aged: rotation.aged,
        });
        destroyed
    }

    /// Trim in the background every `trim_interval` until `cancel` fires or
    /// the pool is disposed. Returns `None` when trimming is disabled or the
    /// interval is too large to ever elapse.
    pub fn spawn_trimmer(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = self.shared.config.trim_interval;
        if interval.is_zero() {
            return None;
        }
        let start = Instant::now().checked_add(interval)?;

        let pool = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if pool.is_disposed() {
                            break;
                        }
                        pool.trim_if_due().await;
                    }
                }
            }
            trace!(pool = %pool.shared.name, "trimmer stopped");
        }))
    }

    // -- disposal ----------------------------------------------------------

    /// Dispose the pool: destroy every ready resource and fail all current
    /// and future acquires with [`Error::Disposed`]. Resources still checked
    /// out are destroyed when they are released. Calling it twice is a no-op.
    pub async fn dispose(&self) {
        let shared = &self.shared;
        let (drained, outstanding) = {
            let mut state = shared.state.lock();
            match state.dispose() {
                Some(drained) => (drained, state.total()),
                None => return,
            }
        };

        shared.available.notify_waiters();
        if outstanding > 0 {
            debug!(
                pool = %shared.name,
                outstanding,
                "resources were still checked out when the pool was disposed"
            );
        }
        self.destroy_detached(drained, DestroyReason::Disposed).await;
        debug!(pool = %shared.name, "disposed pool");
        self.emit(|| PoolEvent::Disposed {
            pool: shared.name.clone(),
            outstanding,
        });
    }

    // -- introspection -----------------------------------------------------

    /// Live resources, checked out or ready.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.state.lock().total()
    }

    /// Resources ready to be handed out (fresh + aged).
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.shared.state.lock().ready()
    }

    /// Snapshot of the pool's accounting and counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Outstanding checkouts, oldest id first. Empty unless
    /// [`PoolConfig::trace`] is set.
    #[must_use]
    pub fn checkouts(&self) -> Vec<Checkout> {
        self.shared.state.lock().checkouts()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().is_disposed()
    }

    /// The pool's configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// The factory's description.
    #[must_use]
    pub fn describe(&self) -> &str {
        &self.shared.name
    }

    /// The factory this pool builds resources with.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    fn emit(&self, event: impl FnOnce() -> PoolEvent) {
        if let Some(events) = &self.shared.events {
            events.emit(event());
        }
    }
}

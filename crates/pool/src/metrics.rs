//! Metrics collection for pool events.
//!
//! Subscribes to the [`EventBus`] and translates events into counters and
//! histograms via the `metrics` crate.
//!
//! Gated behind the `metrics` feature.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, PoolEvent};

/// Background collector recording [`PoolEvent`]s through the `metrics` crate.
///
/// ```rust,ignore
/// let events = Arc::new(EventBus::default());
/// let pool = Pool::with_event_bus(factory, config, Arc::clone(&events));
/// let handle = spawn_metrics_collector(&events, CancellationToken::new());
/// ```
pub struct MetricsCollector {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl MetricsCollector {
    /// Create a collector subscribed to `event_bus`.
    #[must_use]
    pub fn new(event_bus: &EventBus) -> Self {
        Self {
            receiver: event_bus.subscribe(),
        }
    }

    /// Consume events until the bus is dropped or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.receiver.recv() => {
                    match result {
                        Ok(event) => Self::record_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "MetricsCollector lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    }

    fn record_event(event: &PoolEvent) {
        let pool = event.pool().to_owned();
        match event {
            PoolEvent::Created { .. } => {
                metrics::counter!("pool.create.total", "pool" => pool).increment(1);
            }
            PoolEvent::Acquired { waited, .. } => {
                metrics::counter!("pool.acquire.total", "pool" => pool.clone()).increment(1);
                metrics::histogram!("pool.wait.duration_seconds", "pool" => pool)
                    .record(waited.as_secs_f64());
            }
            PoolEvent::Released { held, .. } => {
                metrics::counter!("pool.release.total", "pool" => pool.clone()).increment(1);
                metrics::histogram!("pool.usage.duration_seconds", "pool" => pool)
                    .record(held.as_secs_f64());
            }
            PoolEvent::Blocked { .. } => {
                metrics::counter!("pool.block.total", "pool" => pool).increment(1);
            }
            PoolEvent::Exhausted { .. } => {
                metrics::counter!("pool.exhausted.total", "pool" => pool).increment(1);
            }
            PoolEvent::TimedOut { .. } => {
                metrics::counter!("pool.timeout.total", "pool" => pool).increment(1);
            }
            PoolEvent::Destroyed { reason, .. } => {
                metrics::counter!(
                    "pool.destroy.total",
                    "pool" => pool,
                    "reason" => reason.to_string()
                )
                .increment(1);
            }
            // Destroyed events already count the evictions.
            PoolEvent::Trimmed { .. } | PoolEvent::Disposed { .. } => {}
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish()
    }
}

/// Create a [`MetricsCollector`] and spawn it on the current runtime.
pub fn spawn_metrics_collector(
    event_bus: &Arc<EventBus>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let collector = MetricsCollector::new(event_bus);
    tokio::spawn(collector.run(cancel))
}

//! # Nebula Pool
//!
//! Resource-limiting pool for expensive, reusable resources such as database
//! connections, worker handles or large buffers.
//!
//! - [`Pool`] hands out [`Pooled`] handles under a strict or soft capacity,
//!   optionally making callers wait (with a timeout) when it is full, and
//!   reclaims idle resources with a two-generation trim.
//! - [`ValidatingPool`] health-checks each resource before handing it out and
//!   transparently replaces the ones that fail.
//! - Resources are built and decommissioned by a caller-supplied [`Factory`].
//!
//! ```rust,ignore
//! let pool = Pool::new(ConnectionFactory::new(url), PoolConfig::new(10));
//! let conn = pool.acquire().await?;
//! conn.query("SELECT 1").await?;
//! conn.release().await;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod pool;
pub mod stats;
pub mod validating;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::PoolConfig;
pub use error::{BoxError, Error, Result};
pub use events::{DestroyReason, EventBus, PoolEvent};
pub use factory::Factory;
pub use handle::Pooled;
pub use pool::Pool;
pub use stats::{Checkout, PoolStats};
pub use validating::{ValidatingPool, Validator};

#[cfg(feature = "metrics")]
pub use metrics::{MetricsCollector, spawn_metrics_collector};

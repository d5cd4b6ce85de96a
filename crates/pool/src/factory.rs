//! The factory contract the pool builds, recycles and destroys resources with.

use async_trait::async_trait;

/// Creates and decommissions the resources held by a [`Pool`](crate::Pool).
///
/// The pool never calls into the factory while its internal lock is held, so
/// implementations are free to perform slow I/O (opening a connection,
/// spawning a worker) in any of these methods.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// The pooled resource type.
    type Resource: Send + Sync + 'static;

    /// Error reported by [`create`](Self::create), [`recycle`](Self::recycle)
    /// and [`destroy`](Self::destroy).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Human-readable name used in logs, events and errors (e.g. "postgres").
    fn describe(&self) -> String;

    /// Build a new resource.
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Reset a resource that is being returned to the pool.
    ///
    /// A resource whose recycle fails is destroyed instead of being reused.
    async fn recycle(&self, _resource: &mut Self::Resource) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Permanently decommission a resource.
    ///
    /// Errors are logged by the pool and never reach the caller; the pool's
    /// accounting is corrected regardless.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        drop(resource);
        Ok(())
    }
}

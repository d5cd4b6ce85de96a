//! Blocking pool example
//!
//! Eight workers share three simulated connections. Workers wait when the
//! pool is full; a background trimmer reclaims connections once the burst
//! is over.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_pool::{Factory, Pool, PoolConfig, ValidatingPool};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Connection {
    id: u32,
    queries: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
struct ConnectError;

struct ConnectionFactory {
    host: String,
    next_id: AtomicU32,
}

#[async_trait]
impl Factory for ConnectionFactory {
    type Resource = Connection;
    type Error = ConnectError;

    fn describe(&self) -> String {
        format!("connections to {}", self.host)
    }

    async fn create(&self) -> Result<Connection, ConnectError> {
        // Simulate connection setup
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(id, host = %self.host, "connected");
        Ok(Connection { id, queries: 0 })
    }

    async fn destroy(&self, connection: Connection) -> Result<(), ConnectError> {
        tracing::info!(id = connection.id, queries = connection.queries, "closed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nebula_pool=debug".into()),
        )
        .init();

    let factory = ConnectionFactory {
        host: "localhost:5432".to_string(),
        next_id: AtomicU32::new(0),
    };
    let config = PoolConfig::new(3)
        .with_blocking(Duration::from_secs(2))
        .with_trim_interval(Duration::from_millis(500));

    // Connections that served 5 queries are retired.
    let pool = ValidatingPool::new(Pool::new(factory, config), |c: &Connection| c.queries < 5);
    let cancel = CancellationToken::new();
    let trimmer = pool.spawn_trimmer(cancel.clone());

    let mut workers = tokio::task::JoinSet::new();
    for worker in 0..8 {
        let pool = pool.pool().clone();
        workers.spawn(async move {
            for _ in 0..3 {
                let mut conn = pool.acquire().await?;
                conn.queries += 1;
                tracing::info!(worker, conn = conn.id, "query");
                tokio::time::sleep(Duration::from_millis(20)).await;
                conn.release().await;
            }
            Ok::<_, nebula_pool::Error>(())
        });
    }
    while let Some(result) = workers.join_next().await {
        result??;
    }

    let handle = pool.acquire().await?;
    tracing::info!(queries = handle.queries, "validated connection");
    handle.release().await;

    println!("after burst: {:?}", pool.stats());
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    println!("after idle:  {:?}", pool.stats());

    cancel.cancel();
    if let Some(trimmer) = trimmer {
        trimmer.await?;
    }
    pool.dispose().await;
    Ok(())
}

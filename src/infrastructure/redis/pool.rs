//! Shared Redis connection for the durable job queue.
//!
//! Wraps a [`ConnectionManager`], which multiplexes commands from every
//! worker over one connection and reconnects on its own after drops. The
//! manager is created on first use so startup does not require Redis.

use std::future::Future;

use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::OnceCell;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

pub struct RedisPool {
    client: Client,
    manager: OnceCell<ConnectionManager>,
    url: String,
}

impl RedisPool {
    /// Parse the URL. No connection is opened yet.
    pub fn new(url: &str) -> Result<Self, PoolError> {
        Ok(Self {
            client: Client::open(url)?,
            manager: OnceCell::new(),
            url: url.to_string(),
        })
    }

    async fn manager(&self) -> Result<ConnectionManager, PoolError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                tracing::info!(url = %self.url, "Redis queue connection established");
                Ok::<_, RedisError>(manager)
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to Redis");
                PoolError::ConnectionUnavailable(e.to_string())
            })?;
        Ok(manager.clone())
    }

    /// Run a command with a handle to the shared connection
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.manager().await?;
        Ok(f(conn).await?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

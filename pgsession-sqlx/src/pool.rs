use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use pgsession_core::{Acquired, BoxError, ConnectionPool, DatabaseConfig, PoolStatus};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio_util::sync::CancellationToken;

use crate::connection::SqlxConnection;

/// A [`ConnectionPool`] over an sqlx `PgPool`.
///
/// Each checkout wraps one pool connection in a `PgListener` so the session
/// holding it receives that connection's notifications.
#[derive(Debug, Clone)]
pub struct SqlxPool {
    pool: PgPool,
}

impl SqlxPool {
    /// Open a pool and establish its first connection.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = pool_options(config).connect(&config.url).await?;
        tracing::info!(max_connections = config.pool_size, "database pool connected");
        Ok(Self { pool })
    }

    /// Build a pool that connects on first checkout.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = pool_options(config).connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying sqlx pool.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// This pool as a trait object, ready to hand to a session.
    pub fn shared(&self) -> Arc<dyn ConnectionPool> {
        Arc::new(self.clone())
    }

    /// Close every connection. Pending checkouts fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(config.pool_size)
}

#[async_trait]
impl ConnectionPool for SqlxPool {
    async fn acquire(&self) -> Result<Acquired, BoxError> {
        let listener = PgListener::connect_with(&self.pool).await?;
        let stop = CancellationToken::new();
        let connection = SqlxConnection::spawn(listener, stop.clone());
        Ok(Acquired {
            connection: Arc::new(connection),
            release: Box::new(move || stop.cancel()),
        })
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.pool.options().get_max_connections(),
        }
    }
}

/// Pools keyed by connection URL.
///
/// Sessions built from the same [`DatabaseConfig`] share one pool. The first
/// configuration seen for a URL decides the pool size.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<DashMap<String, SqlxPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool for `config.url`, connecting it on first use.
    pub async fn get_or_connect(&self, config: &DatabaseConfig) -> Result<SqlxPool, sqlx::Error> {
        if let Some(pool) = self.get(&config.url) {
            return Ok(pool);
        }
        let pool = SqlxPool::connect(config).await?;
        // A concurrent caller may have won the race; keep its pool.
        Ok(self.pools.entry(config.url.clone()).or_insert(pool).clone())
    }

    /// The pool for `config.url`, created lazily without connecting.
    pub fn get_or_lazy(&self, config: &DatabaseConfig) -> Result<SqlxPool, sqlx::Error> {
        if let Some(pool) = self.get(&config.url) {
            return Ok(pool);
        }
        let pool = SqlxPool::connect_lazy(config)?;
        Ok(self.pools.entry(config.url.clone()).or_insert(pool).clone())
    }

    pub fn get(&self, url: &str) -> Option<SqlxPool> {
        self.pools.get(url).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Close and forget every pool.
    pub async fn close_all(&self) {
        let pools: Vec<SqlxPool> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        self.pools.clear();
        for pool in pools {
            pool.close().await;
        }
    }
}

//! Lazily created pools, one per `PoolKey`

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use ferry_core::Result;

use super::config::PoolConfig;
use super::connector::{Connector, DriverConnector, PoolKey};
use super::pool::{ConnectionPool, PooledConnection};
use super::stats::PoolStats;

/// Owns every pool the pipeline touches
///
/// A pool is created the first time its key is requested. New pools are
/// pre-warmed to `min_size` and swept by a background reaper task.
pub struct PoolRegistry {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    pools: DashMap<PoolKey, Arc<ConnectionPool>>,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_connector(config, Arc::new(DriverConnector))
    }

    pub fn with_connector(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: config.normalized(),
            connector,
            pools: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get or create the pool for `key`
    pub fn pool(&self, key: &PoolKey) -> Arc<ConnectionPool> {
        if let Some(pool) = self.pools.get(key) {
            return Arc::clone(pool.value());
        }

        let mut created = false;
        let pool = self
            .pools
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                ConnectionPool::new(key.clone(), self.config.clone(), Arc::clone(&self.connector))
            })
            .value()
            .clone();

        if created {
            tracing::info!(pool = %key, max_size = self.config.max_size(), "created connection pool");
            self.spawn_background(&pool);
        }
        pool
    }

    fn spawn_background(&self, pool: &Arc<ConnectionPool>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if self.config.min_size() > 0 {
            let warm = Arc::clone(pool);
            handle.spawn(async move {
                warm.prewarm().await;
            });
        }

        let weak: Weak<ConnectionPool> = Arc::downgrade(pool);
        let period = self.config.reap_interval();
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }
                pool.reap_idle().await;
            }
        });
    }

    /// Acquire a connection for `key` with the configured timeout
    pub async fn acquire(&self, key: &PoolKey) -> Result<PooledConnection> {
        self.pool(key).acquire_default().await
    }

    /// Stats for every live pool
    pub fn stats(&self) -> Vec<(PoolKey, PoolStats)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.pools.contains_key(key)
    }

    /// Remove and close the pool for `key`, if any
    pub async fn close_pool(&self, key: &PoolKey) -> bool {
        match self.pools.remove(key) {
            Some((_, pool)) => {
                pool.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let keys: Vec<PoolKey> = self.pools.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.close_pool(&key).await;
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("config", &self.config)
            .field("pools", &self.pools.len())
            .finish()
    }
}

//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use ferry_core::{Connection, FerryError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::connector::{Connector, PoolKey};
use super::stats::PoolStats;

/// An open connection waiting in the idle queue
struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

/// A bounded pool of connections for a single `PoolKey`
///
/// At most `max_size` connections are handed out at once; further callers
/// wait until a slot is released or their timeout expires. Connections are
/// returned with [`PooledConnection::release`], or on drop.
pub struct ConnectionPool {
    key: PoolKey,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// One permit per handed-out connection
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    created_count: AtomicUsize,
    waiting_count: AtomicUsize,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(key: PoolKey, config: PoolConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Arc::new(Self {
            key,
            config,
            connector,
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            created_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire with the configured acquire timeout
    pub async fn acquire_default(self: &Arc<Self>) -> Result<PooledConnection> {
        self.acquire(self.config.acquire_timeout()).await
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Wait for a free slot, failing with `AcquisitionTimeout` once `timeout` elapses
    /// 2. Reuse a valid idle connection if one exists
    /// 3. Otherwise open a new one through the connector
    ///
    /// A failure to open a connection frees the slot again.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(FerryError::Connection(format!("Pool {} is closed", self.key)));
        }

        self.waiting_count.fetch_add(1, Ordering::SeqCst);
        let permit = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await;
        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(FerryError::Connection(format!("Pool {} is closed", self.key)));
            }
            Err(_) => {
                tracing::warn!(pool = %self.key, timeout_ms = timeout.as_millis() as u64, "connection acquisition timed out");
                return Err(FerryError::AcquisitionTimeout {
                    key: self.key.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let (connection, created_at) = match self.try_get_idle().await {
            Some(idle) => (idle.connection, idle.created_at),
            None => {
                // `permit` drops on error, freeing the slot
                let connection = self.connector.connect(&self.key).await?;
                self.created_count.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(pool = %self.key, "opened new connection");
                (connection, Instant::now())
            }
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            connection,
            created_at,
            pool: Arc::clone(self),
            _permit: permit,
            released: false,
        })
    }

    /// Pop idle connections until one passes the lifetime, idle and validity checks
    async fn try_get_idle(&self) -> Option<IdleConnection> {
        loop {
            let candidate = { self.idle.lock().pop_front() }?;

            if self.is_expired(&candidate, Instant::now())
                || !self.connector.validate(&*candidate.connection).await
            {
                let _ = candidate.connection.close().await;
                continue;
            }
            return Some(candidate);
        }
    }

    fn is_expired(&self, idle: &IdleConnection, now: Instant) -> bool {
        if let Some(max_lifetime) = self.config.max_lifetime() {
            if now.duration_since(idle.created_at) > max_lifetime {
                return true;
            }
        }
        now.duration_since(idle.last_used_at) > self.config.idle_timeout()
    }

    /// Return a connection to the idle queue.
    ///
    /// Returns the connection back when it must be closed instead: it failed
    /// validation, the pool is closed, or the idle queue is already full.
    fn check_in(
        &self,
        connection: Arc<dyn Connection>,
        created_at: Instant,
        valid: bool,
    ) -> Option<Arc<dyn Connection>> {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if !valid || connection.is_closed() || self.is_closed() {
            return Some(connection);
        }
        let mut idle = self.idle.lock();
        if idle.len() >= self.config.max_size() {
            return Some(connection);
        }
        idle.push_back(IdleConnection {
            connection,
            created_at,
            last_used_at: Instant::now(),
        });
        None
    }

    /// Open connections until `min_size` are idle. Failures are logged, not returned.
    pub async fn prewarm(&self) -> usize {
        let wanted = self
            .config
            .min_size()
            .saturating_sub(self.idle.lock().len());
        let mut opened = 0;
        for _ in 0..wanted {
            if self.is_closed() {
                break;
            }
            match self.connector.connect(&self.key).await {
                Ok(connection) => {
                    self.created_count.fetch_add(1, Ordering::SeqCst);
                    let now = Instant::now();
                    self.idle.lock().push_back(IdleConnection {
                        connection,
                        created_at: now,
                        last_used_at: now,
                    });
                    opened += 1;
                }
                Err(e) => {
                    tracing::warn!(pool = %self.key, error = %e, "pre-warm connection failed");
                    break;
                }
            }
        }
        if opened > 0 {
            tracing::debug!(pool = %self.key, opened, "pool pre-warmed");
        }
        opened
    }

    /// Close idle connections past their idle timeout or lifetime
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<IdleConnection> = {
            let mut idle = self.idle.lock();
            let (expired, kept): (Vec<_>, Vec<_>) =
                idle.drain(..).partition(|c| self.is_expired(c, now));
            idle.extend(kept);
            expired
        };

        let reaped = expired.len();
        for idle in expired {
            let _ = idle.connection.close().await;
        }
        if reaped > 0 {
            tracing::debug!(pool = %self.key, reaped, "reaped idle connections");
        }
        reaped
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active_count.load(Ordering::SeqCst),
            idle: self.idle.lock().len(),
            created: self.created_count.load(Ordering::SeqCst),
            waiting: self.waiting_count.load(Ordering::SeqCst),
            max_size: self.config.max_size(),
        }
    }

    /// Close every idle connection and refuse new acquisitions.
    ///
    /// Connections still handed out are closed when they come back.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();
        let connections: Vec<_> = { self.idle.lock().drain(..).collect() };
        for idle in connections {
            let _ = idle.connection.close().await;
        }
        tracing::debug!(pool = %self.key, "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("key", &self.key)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A connection borrowed from the pool
///
/// Prefer [`release`](Self::release), which validates the connection before
/// reuse. Dropping without releasing returns it unvalidated.
pub struct PooledConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
    released: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Validate and return the connection to its pool
    pub async fn release(mut self) {
        self.released = true;
        let valid = self.pool.connector.validate(&*self.connection).await;
        let disposed = self
            .pool
            .check_in(Arc::clone(&self.connection), self.created_at, valid);
        if let Some(connection) = disposed {
            let _ = connection.close().await;
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let disposed = self
            .pool
            .check_in(Arc::clone(&self.connection), self.created_at, true);
        if let Some(connection) = disposed {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = connection.close().await;
                });
            }
        }
    }
}

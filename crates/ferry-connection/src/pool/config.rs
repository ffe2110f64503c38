//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and connection lifecycle. Every pool the
/// registry creates shares one `PoolConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened in the background when a pool is created
    min_size: usize,
    /// Maximum number of connections handed out at once
    max_size: usize,
    /// Default timeout in milliseconds when acquiring a connection
    acquire_timeout_ms: u64,
    /// Idle connections unused for longer than this are closed
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
    /// How often the background reaper sweeps idle connections
    reap_interval_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes.
    ///
    /// `max_size` is raised to at least 1 and `min_size` capped at `max_size`.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            min_size: min_size.min(max_size),
            max_size,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
            reap_interval_ms: 60_000,
        }
    }

    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    pub fn with_reap_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reap_interval_ms = interval_ms.max(1);
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.max(1))
    }

    /// Repair values a hand-written config file may get wrong
    pub fn normalized(self) -> Self {
        let max_size = self.max_size.max(1);
        Self {
            min_size: self.min_size.min(max_size),
            max_size,
            ..self
        }
    }
}

impl Default for PoolConfig {
    /// Defaults: min 1, max 10, acquire 30 s, idle 10 min, reap every minute
    fn default() -> Self {
        Self::new(1, 10)
    }
}

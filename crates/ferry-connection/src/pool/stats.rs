//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections currently handed out
    pub active: usize,
    /// Open connections waiting in the idle queue
    pub idle: usize,
    /// Connections opened over the pool's lifetime
    pub created: usize,
    /// Callers blocked waiting for a slot
    pub waiting: usize,
    pub max_size: usize,
}

impl PoolStats {
    /// Fraction of the pool's slots in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Every slot is handed out
    pub fn is_full(&self) -> bool {
        self.max_size > 0 && self.active >= self.max_size
    }

    /// Open connections, in use or idle
    pub fn open(&self) -> usize {
        self.active + self.idle
    }
}

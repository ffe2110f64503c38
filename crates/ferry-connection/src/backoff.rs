//! Exponential backoff between retry attempts

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with an optional ±25% jitter.
///
/// ```
/// use ferry_connection::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(500, 30_000);
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(500));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(1_000));
/// assert_eq!(backoff.calculate_delay(20), Duration::from_millis(30_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter: bool,
}

impl BackoffStrategy {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (zero-based): `initial * multiplier^attempt`, capped
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        if !self.jitter {
            return Duration::from_millis(capped_ms);
        }
        let spread = capped_ms / 4;
        if spread == 0 {
            return Duration::from_millis(capped_ms);
        }
        let offset = rand::thread_rng().gen_range(0..=spread * 2);
        Duration::from_millis(capped_ms - spread + offset)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = BackoffStrategy::new(100, 1_000);
        let delays: Vec<u64> = (0..6)
            .map(|n| backoff.calculate_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let backoff = BackoffStrategy::new(400, 400).with_jitter(true);
        for _ in 0..50 {
            let ms = backoff.calculate_delay(3).as_millis() as u64;
            assert!((300..=500).contains(&ms), "delay {} out of range", ms);
        }
    }

    #[test]
    fn test_zero_initial_is_raised() {
        let backoff = BackoffStrategy::new(0, 0);
        assert_eq!(backoff.initial_delay(), Duration::from_millis(1));
        assert_eq!(backoff.max_delay(), Duration::from_millis(1));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let backoff = BackoffStrategy::new(500, 30_000);
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(30_000));
    }
}

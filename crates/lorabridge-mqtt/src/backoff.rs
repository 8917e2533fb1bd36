use std::time::Duration;

/// Observable phase of a supervised broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    GivenUp,
}

/// Exponential backoff schedule for broker reconnects.
///
/// Delay grows as `base * rate^(attempt-1)` up to `cap`; the counter
/// resets on every successful connection, so the allowance applies per
/// outage, not per process lifetime.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    rate: u32,
    cap: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, rate: u32, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            rate,
            cap,
            max_attempts,
            attempts: 0,
        }
    }

    /// Record a failed connection attempt. Returns the delay to wait
    /// before the next attempt, or `None` once the allowance is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }
        let factor = self.rate.saturating_pow(self.attempts - 1);
        Some(self.base.saturating_mul(factor).min(self.cap))
    }

    /// Reset the schedule after a successful connection.
    pub fn record_success(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2, Duration::from_secs(60), 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|_| policy.record_failure().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..12 {
            assert!(policy.record_failure().is_some());
        }
        assert_eq!(policy.record_failure(), None);
        assert_eq!(policy.record_failure(), None);
    }

    #[test]
    fn test_success_resets_schedule() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..5 {
            policy.record_failure();
        }
        policy.record_success();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.record_failure(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_custom_schedule() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_millis(500), 3, Duration::from_secs(10), 4);
        assert_eq!(policy.record_failure(), Some(Duration::from_millis(500)));
        assert_eq!(policy.record_failure(), Some(Duration::from_millis(1500)));
        assert_eq!(policy.record_failure(), Some(Duration::from_millis(4500)));
        assert_eq!(policy.record_failure(), Some(Duration::from_secs(10)));
        assert_eq!(policy.record_failure(), None);
    }
}

use std::fmt;
use std::time::Duration;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Exponential reconnect schedule: the delay doubles per consecutive
/// failure up to `max`, and gives out after `max_attempts` failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            attempts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial.min(self.max)
    }

    /// Record a failed attempt. Returns the wait before the next one, or
    /// `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.max_attempts {
            return None;
        }
        Some(self.delay_for(self.attempts))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(max_attempts: u32) -> Backoff {
        Backoff::new(&ReconnectConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            max_attempts,
        })
    }

    #[test]
    fn test_delays_double_and_cap() {
        let mut backoff = backoff(10);
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().unwrap().as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn test_exhausted_on_fifth_failure() {
        let mut backoff = backoff(5);
        for _ in 0..4 {
            assert!(backoff.next_delay().is_some());
        }
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_default_schedule_gives_up_before_cap() {
        let mut backoff = Backoff::new(&ReconnectConfig::default());
        let mut delays = Vec::new();
        while let Some(delay) = backoff.next_delay() {
            delays.push(delay.as_millis() as u64);
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = backoff(5);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1_000)));
    }
}

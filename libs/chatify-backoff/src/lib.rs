//! Exponential backoff (C3).
//!
//! Stateful, resettable delay generator used by the broadcast and persister
//! consumer loops (`chat-broadcast`, `chat-persister`) both for the
//! outer poll-retry loop and for the persister's inner per-message retry.
//! Not safe to share across concurrent loops — one instance per loop.

pub mod circuit;

use rand::Rng;
use std::time::Duration;

/// Configuration for a [`Backoff`] instance.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub jitter_max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(30),
            jitter_max: Duration::from_millis(100),
        }
    }
}

/// `next()` returns `min(initial * 2^(attempt-1), max) + rand[0, jitter_max)`
/// and advances the attempt counter. `reset()` returns it to the first
/// attempt.
///
/// ```
/// use chatify_backoff::{Backoff, BackoffConfig};
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(BackoffConfig {
///     initial: Duration::from_millis(100),
///     max: Duration::from_secs(1),
///     jitter_max: Duration::from_millis(0),
/// });
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(400));
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Computes the next delay without sleeping, advancing internal state.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let pow = self.attempt.saturating_sub(1).min(20);
        let scaled = self
            .config
            .initial
            .saturating_mul(1u32.checked_shl(pow).unwrap_or(u32::MAX));
        let capped = scaled.min(self.config.max);
        let jitter = if self.config.jitter_max.is_zero() {
            Duration::ZERO
        } else {
            let jitter_ms = rand::rng().random_range(0..=self.config.jitter_max.as_millis() as u64);
            Duration::from_millis(jitter_ms)
        };
        capped.saturating_add(jitter).min(self.config.max + self.config.jitter_max)
    }

    /// Computes the next delay and sleeps for it.
    pub async fn sleep_next(&mut self) {
        tokio::time::sleep(self.next_delay()).await;
    }

    /// Resets the attempt counter so the next call starts from `initial` again.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(50),
            max: Duration::from_secs(2),
            jitter_max: Duration::ZERO,
        }
    }

    #[test]
    fn delays_double_until_capped_at_max() {
        let mut backoff = Backoff::new(no_jitter());
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1600));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn reset_returns_to_first_attempt() {
        let mut backoff = Backoff::new(no_jitter());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn jitter_never_exceeds_configured_max_plus_jitter() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter_max: Duration::from_millis(50),
        });
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_next_actually_sleeps_for_the_computed_delay() {
        let mut backoff = Backoff::new(no_jitter());
        let start = tokio::time::Instant::now();
        backoff.sleep_next().await;
        assert!(tokio::time::Instant::now() - start >= Duration::from_millis(50));
    }
}

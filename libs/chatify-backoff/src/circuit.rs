//! Circuit breaker guarding the persister's history-store write path.
//!
//! Layered on top of [`crate::Backoff`]: once `failure_threshold` consecutive
//! transient failures have been observed, the breaker opens for
//! `open_duration` before allowing a single half-open probe through, so a
//! down store doesn't have every replica's retry loop spinning at full
//! speed.

use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum CircuitState {
    Closed { consecutive_failures: u32 },
    HalfOpen,
    Open { reopen_at: Instant },
}

#[derive(Clone, Debug)]
pub struct CircuitLabels {
    pub component: String,
    pub replica_id: String,
}

impl CircuitLabels {
    pub fn new(component: impl Into<String>, replica_id: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            replica_id: replica_id.into(),
        }
    }
}

pub struct CircuitBreaker {
    state: CircuitState,
    settings: CircuitSettings,
    labels: CircuitLabels,
}

impl CircuitBreaker {
    pub fn new(settings: CircuitSettings, labels: CircuitLabels) -> Self {
        Self {
            state: CircuitState::Closed {
                consecutive_failures: 0,
            },
            settings,
            labels,
        }
    }

    /// Blocks until the breaker is ready to let a request through: returns
    /// immediately when closed or half-open; sleeps out the remainder of the
    /// open window and transitions to half-open otherwise.
    pub async fn before_request(&mut self) {
        if let CircuitState::Open { reopen_at } = self.state {
            let now = Instant::now();
            if reopen_at > now {
                let sleep = reopen_at - now;
                debug!(?sleep, "circuit breaker sleeping before half-open probe");
                tokio::time::sleep(sleep).await;
            }
            self.state = CircuitState::HalfOpen;
            info!(
                component = self.labels.component,
                replica_id = self.labels.replica_id,
                "circuit breaker half-open probe"
            );
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open { .. })
    }

    pub fn on_success(&mut self) {
        match self.state {
            CircuitState::Closed {
                ref mut consecutive_failures,
            } => {
                if *consecutive_failures > 0 {
                    debug!(failures = *consecutive_failures, "resetting failure counter");
                }
                *consecutive_failures = 0;
            }
            CircuitState::HalfOpen | CircuitState::Open { .. } => {
                info!(
                    component = self.labels.component,
                    replica_id = self.labels.replica_id,
                    "circuit breaker closed"
                );
                counter!(
                    "chatify_persister_circuit_events_total",
                    "state" => "closed",
                    "component" => self.labels.component.clone(),
                    "replica_id" => self.labels.replica_id.clone(),
                )
                .increment(1);
                self.state = CircuitState::Closed {
                    consecutive_failures: 0,
                };
            }
        }
    }

    pub fn on_failure(&mut self) {
        match self.state {
            CircuitState::Closed {
                ref mut consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.settings.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open { .. } => {}
        }
    }

    fn open(&mut self) {
        let reopen_at = Instant::now() + self.settings.open_duration;
        self.state = CircuitState::Open { reopen_at };
        warn!(
            component = self.labels.component,
            replica_id = self.labels.replica_id,
            reopen_in = ?self.settings.open_duration,
            "circuit breaker opened"
        );
        counter!(
            "chatify_persister_circuit_events_total",
            "state" => "open",
            "component" => self.labels.component.clone(),
            "replica_id" => self.labels.replica_id.clone(),
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> CircuitLabels {
        CircuitLabels::new("persister", "replica-a")
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut breaker = CircuitBreaker::new(
            CircuitSettings {
                failure_threshold: 3,
                open_duration: Duration::from_secs(1),
            },
            labels(),
        );
        breaker.on_failure();
        breaker.on_failure();
        assert!(!breaker.is_open());
        breaker.on_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn success_resets_failure_counter_while_closed() {
        let mut breaker = CircuitBreaker::new(
            CircuitSettings {
                failure_threshold: 2,
                open_duration: Duration::from_secs(1),
            },
            labels(),
        );
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_failure_reopens_the_breaker() {
        let mut breaker = CircuitBreaker::new(
            CircuitSettings {
                failure_threshold: 1,
                open_duration: Duration::from_millis(50),
            },
            labels(),
        );
        breaker.on_failure();
        assert!(breaker.is_open());
        breaker.before_request().await;
        breaker.on_failure();
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_success_closes_the_breaker() {
        let mut breaker = CircuitBreaker::new(
            CircuitSettings {
                failure_threshold: 1,
                open_duration: Duration::from_millis(50),
            },
            labels(),
        );
        breaker.on_failure();
        breaker.before_request().await;
        breaker.on_success();
        assert!(!breaker.is_open());
    }
}

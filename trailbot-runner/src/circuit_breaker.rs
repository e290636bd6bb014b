//! Circuit breaker for exchange rate limiting and IP bans.
//!
//! When the exchange answers HTTP 403 (IP ban), or a run of requests fails
//! (429, 5xx, network), the breaker trips and refuses all requests for a
//! cooldown period. The controller then sees `ExchangeError::CircuitOpen`
//! and skips the affected pairs instead of hammering the API.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests are allowed.
    Closed,
    /// Tripped. Requests are refused until the cooldown expires.
    Open { tripped_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

/// Circuit breaker shared by every request of one exchange client.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 5-minute cooldown, trips after 5 consecutive failures.
    pub fn default_exchange() -> Self {
        Self::new(Duration::from_secs(5 * 60), 5)
    }

    // A poisoned lock only means another thread panicked mid-update; the
    // counters are still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if requests are currently allowed.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    // Cooldown expired, close again
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request and reset the failure counter.
    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    /// Record a failure. Trips the breaker once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            tracing::warn!(
                failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "exchange circuit breaker tripped"
            );
            inner.state = BreakerState::Open {
                tripped_at: Instant::now(),
            };
        }
    }

    /// Immediately trip the breaker (for 403 Forbidden / IP ban).
    pub fn trip(&self) {
        tracing::error!(
            cooldown_secs = self.cooldown.as_secs(),
            "exchange refused access, circuit breaker tripped"
        );
        self.lock().state = BreakerState::Open {
            tripped_at: Instant::now(),
        };
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Remaining cooldown time (zero if not tripped).
    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { tripped_at } => self.cooldown.saturating_sub(tripped_at.elapsed()),
        }
    }
}

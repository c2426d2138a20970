//! Circuit breaker for the completion dependency.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub recovery_time: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_time: Duration::from_secs(45),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Failing fast, calls are rejected immediately.
    Open,
    /// Cooldown elapsed, one probe call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Raised by [`CircuitBreaker::allow`] while the circuit is open.
#[derive(Debug, Clone, Copy, Error)]
#[error("circuit breaker open, retry after {:.2}s", retry_after.as_secs_f64())]
pub struct BreakerOpen {
    /// Remaining cooldown; zero means "a probe is already in flight".
    pub retry_after: Duration,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-dependency circuit breaker, shared across sessions.
///
/// The whole check-then-update sequence runs under one internal lock, so
/// concurrent callers observe a consistent state. Instances are meant to be
/// injected (`Arc<CircuitBreaker>`) rather than reached through globals, so
/// tests can build isolated breakers.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Asks the breaker whether a call may go upstream right now.
    ///
    /// While open this fails fast with the remaining cooldown. After the
    /// cooldown elapses exactly one caller is admitted as the probe; everyone
    /// else keeps failing fast until the probe reports back.
    pub fn allow(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        let Some(opened_at) = inner.opened_at else {
            return Ok(());
        };

        let elapsed = opened_at.elapsed();
        if elapsed < self.config.recovery_time {
            return Err(BreakerOpen {
                retry_after: self.config.recovery_time - elapsed,
            });
        }

        if inner.probe_in_flight {
            return Err(BreakerOpen {
                retry_after: Duration::ZERO,
            });
        }

        inner.probe_in_flight = true;
        Ok(())
    }

    /// Reports a successful upstream call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Reports a failed upstream call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        if inner.probe_in_flight {
            // Probe failed: reopen and restart the cooldown clock.
            inner.probe_in_flight = false;
            inner.opened_at = Some(Instant::now());
            return;
        }

        inner.failures += 1;
        if inner.failures >= self.config.failure_threshold && inner.opened_at.is_none() {
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Current state, for observability and tests.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() < self.config.recovery_time => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
        }
    }

    /// Consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().expect("breaker lock poisoned").failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

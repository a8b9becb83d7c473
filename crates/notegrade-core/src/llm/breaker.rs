use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::CircuitConfig;
use crate::error::{LlmError, LlmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// Cool-down elapsed; one trial call is allowed through.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Process-wide breaker in front of the judge provider.
///
/// Opens after `failure_threshold` consecutive failures. While open every call
/// fails with [`LlmError::Unavailable`]. After `cooldown` a single trial is let
/// through: success closes the circuit, failure re-opens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent across a panic in another holder.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make a call. Fails fast while the circuit is open.
    pub fn try_acquire(&self) -> LlmResult<Permit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.cooldown);
                if !cooled {
                    return Err(LlmError::Unavailable);
                }
                transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(LlmError::Unavailable);
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if trial {
            inner.trial_in_flight = false;
        }
        if inner.state == CircuitState::HalfOpen && trial {
            transition(&mut inner, CircuitState::Closed);
            inner.opened_at = None;
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if trial {
            inner.trial_in_flight = false;
        }
        let trip = match inner.state {
            CircuitState::HalfOpen => trial,
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            transition(&mut inner, CircuitState::Open);
            inner.opened_at = Some(Instant::now());
        }
    }

    fn release(&self, trial: bool) {
        if trial {
            self.lock().trial_in_flight = false;
        }
    }
}

fn transition(inner: &mut BreakerInner, to: CircuitState) {
    let from = inner.state;
    if from == to {
        return;
    }
    inner.state = to;
    match to {
        CircuitState::Open => warn!(
            from = %from,
            to = %to,
            consecutive_failures = inner.consecutive_failures,
            "circuit breaker opened"
        ),
        _ => info!(from = %from, to = %to, "circuit breaker transition"),
    }
}

/// Right to make one call. Report the result with [`succeed`](Permit::succeed)
/// or [`fail`](Permit::fail); dropping it records nothing.
#[must_use = "a permit must be settled or dropped after the call"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitConfig {
            failure_threshold: threshold,
            cooldown_ms,
        })
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(3, 60_000);
        for _ in 0..2 {
            b.try_acquire().unwrap().fail();
        }
        assert_eq!(b.state(), CircuitState::Closed);
        b.try_acquire().unwrap().fail();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.try_acquire().unwrap_err(), LlmError::Unavailable);
    }

    #[test]
    fn success_resets_the_count() {
        let b = breaker(2, 60_000);
        b.try_acquire().unwrap().fail();
        b.try_acquire().unwrap().succeed();
        b.try_acquire().unwrap().fail();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[test]
    fn half_open_allows_one_trial() {
        let b = breaker(1, 10);
        b.try_acquire().unwrap().fail();
        assert_eq!(b.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));

        let trial = b.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.try_acquire().unwrap_err(), LlmError::Unavailable);

        trial.succeed();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(!b.try_acquire().unwrap().is_trial());
    }

    #[test]
    fn failed_trial_reopens() {
        let b = breaker(1, 10);
        b.try_acquire().unwrap().fail();
        std::thread::sleep(Duration::from_millis(20));
        b.try_acquire().unwrap().fail();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.try_acquire().unwrap_err(), LlmError::Unavailable);
    }

    #[test]
    fn dropped_trial_frees_the_slot() {
        let b = breaker(1, 10);
        b.try_acquire().unwrap().fail();
        std::thread::sleep(Duration::from_millis(20));
        drop(b.try_acquire().unwrap());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().unwrap().is_trial());
    }
}

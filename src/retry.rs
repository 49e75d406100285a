//! The retry budget shared by `StatusFetcher`, `InfoFetcher`, and
//! `UpdateSender`.
//!
//! §5 of the ambient-stack spec calls for reusing this workspace's
//! `CircuitBreakerBehavior` shape rather than inventing an ad hoc backoff
//! loop. The twist here is that the threshold is wall-clock time
//! (`max_error_duration`), not a failure count: a worker that is merely
//! slow should not trip the breaker after five polls if each one
//! eventually succeeds, but a worker that has been unreachable for the
//! whole error-duration window has earned a terminal `REMOTE_TASK_ERROR`.
//!
//! Each of the three loops owns one of these (they are not shared across
//! loops) — `max_error_duration` is "shared across all loops but counted
//! per-loop" per spec.md §4.4.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use rtc_shared::resilience::{CircuitBreakerBehavior, CircuitBreakerMetrics, CircuitState};

use crate::clock::Clock;

#[derive(Debug)]
struct Inner {
    /// When the current unbroken streak of transient failures began.
    /// Cleared on the next success.
    streak_started_at: Option<tokio::time::Instant>,
    exhausted: bool,
}

/// A per-loop error-duration budget.
#[derive(Debug)]
pub struct ErrorDurationBreaker {
    name: String,
    max_error_duration: Duration,
    clock: std::sync::Arc<dyn Clock>,
    inner: Mutex<Inner>,
    attempts_in_streak: AtomicU32,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl ErrorDurationBreaker {
    pub fn new(
        name: impl Into<String>,
        max_error_duration: Duration,
        clock: std::sync::Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            max_error_duration,
            clock,
            inner: Mutex::new(Inner {
                streak_started_at: None,
                exhausted: false,
            }),
            attempts_in_streak: AtomicU32::new(0),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// Exponential backoff for the given attempt number within the current
    /// failure streak, capped at 30s so a long `max_error_duration` doesn't
    /// turn into a single enormous sleep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_millis = 100u64;
        let capped_attempt = attempt.min(8);
        let millis = base_millis.saturating_mul(1u64 << capped_attempt);
        Duration::from_millis(millis).min(Duration::from_secs(30))
    }

    /// Attempt number to use for the *next* backoff, i.e. how many
    /// consecutive failures this streak has accumulated so far.
    pub fn attempt(&self) -> u32 {
        self.attempts_in_streak.load(Ordering::Acquire)
    }

    /// True once the current failure streak has been running for at least
    /// `max_error_duration` — the signal to stop retrying and fail the
    /// task with `REMOTE_TASK_ERROR`.
    pub fn is_exhausted(&self) -> bool {
        self.inner.lock().exhausted
    }

    /// How long the current (or most recently exhausted) failure streak
    /// has been running, for error messages.
    pub fn streak_elapsed(&self) -> Duration {
        let inner = self.inner.lock();
        match inner.streak_started_at {
            Some(started) => self.clock.now().saturating_duration_since(started),
            None => Duration::ZERO,
        }
    }
}

impl CircuitBreakerBehavior for ErrorDurationBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        if self.is_exhausted() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    fn should_allow(&self) -> bool {
        !self.is_exhausted()
    }

    fn record_success(&self, _duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.attempts_in_streak.store(0, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.streak_started_at = None;
        inner.exhausted = false;
    }

    fn record_failure(&self, _duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.attempts_in_streak.fetch_add(1, Ordering::AcqRel);

        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let started = *inner.streak_started_at.get_or_insert(now);
        if now.saturating_duration_since(started) >= self.max_error_duration {
            inner.exhausted = true;
        }
    }

    fn is_healthy(&self) -> bool {
        !self.is_exhausted()
    }

    fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.exhausted = true;
        inner.streak_started_at.get_or_insert(self.clock.now());
    }

    fn force_closed(&self) {
        self.attempts_in_streak.store(0, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.exhausted = false;
        inner.streak_started_at = None;
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.attempts_in_streak.load(Ordering::Acquire) as u64,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: self.state(),
            failure_rate: if total_calls == 0 {
                0.0
            } else {
                failure_count as f64 / total_calls as f64
            },
            success_rate: if total_calls == 0 {
                0.0
            } else {
                success_count as f64 / total_calls as f64
            },
            average_duration: Duration::ZERO,
        }
    }
}

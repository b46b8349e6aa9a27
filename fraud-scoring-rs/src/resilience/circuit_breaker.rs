//! Circuit breaker for the scoring engine
//!
//! ```text
//! Closed    -> Open:      >= min_requests in the window and failure ratio >= threshold
//! Open      -> Half-Open: open_timeout elapsed, checked on the next call
//! Half-Open -> Open:      any trial call fails
//! Half-Open -> Closed:    half_open_max_calls consecutive trial successes
//! ```
//!
//! All state lives behind a single mutex. Admission, outcome recording and
//! transitions each happen inside one critical section, so concurrent callers
//! cannot lose counter updates or admit more trial calls than allowed.
//!
//! Counts belong to a generation. A new generation starts on every
//! transition and whenever the Closed-state interval runs out; outcomes of
//! calls admitted under an older generation are ignored.
//!
//! Transitions are queued under the state lock and published afterwards by
//! one dispatcher at a time, so observers see them in the order they
//! happened, though not always on the thread that caused them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::CircuitState;
use crate::error::{Result, ScoringError};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Length of the Closed-state counting window; zero keeps counts forever
    pub interval: Duration,

    /// Calls needed in the window before the failure ratio is considered
    pub min_requests: u32,

    /// Failure ratio (0.0-1.0] that trips the circuit
    pub failure_threshold: f64,

    /// Time spent Open before trial calls are let through
    pub open_timeout: Duration,

    /// Trial calls admitted while Half-Open, and successes needed to close
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_requests: 3,
            failure_threshold: 0.6,
            open_timeout: Duration::from_secs(30),
            half_open_max_calls: 5,
        }
    }
}

/// Call counts for the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    requests: u32,
    total_successes: u32,
    total_failures: u32,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_release(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerHealth {
    pub state: CircuitState,
    /// Calls admitted in the current generation
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    /// Time since the last state transition
    pub time_in_state: Duration,
    /// Remaining cool-down while Open
    pub retry_after: Option<Duration>,
    /// Calls rejected since the breaker was created
    pub rejected: u64,
}

/// Observer invoked after every state transition with (name, from, to, health)
pub type StateChangeCallback =
    Arc<dyn Fn(&str, CircuitState, CircuitState, BreakerHealth) + Send + Sync>;

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the Closed window or of the Open cool-down
    expiry: Option<Instant>,
    last_transition: Instant,
    /// Transitions not yet published, oldest first
    pending: Vec<Transition>,
}

/// A transition that happened inside the lock and still has to be reported
#[derive(Debug)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    health: BreakerHealth,
}

/// Process-wide guard around one protected dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
    /// Held while publishing transitions
    dispatch: Mutex<()>,
    rejected: AtomicU64,
    state_change_callback: Option<StateChangeCallback>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a breaker on the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a breaker on an explicit clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let mut inner = BreakerInner {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
            last_transition: now,
            pending: Vec::new(),
        };
        inner.expiry = closed_expiry(&config, now);

        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(inner),
            dispatch: Mutex::new(()),
            rejected: AtomicU64::new(0),
            state_change_callback: None,
        }
    }

    /// Register an observer for state transitions
    pub fn set_state_change_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, CircuitState, CircuitState, BreakerHealth) + Send + Sync + 'static,
    {
        self.state_change_callback = Some(Arc::new(callback));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` under the breaker.
    ///
    /// Rejected calls return `ScoringError::CircuitOpen` without running
    /// `operation`. Engine errors are recorded as failures; any other outcome
    /// is recorded as a success.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;

        match &result {
            Err(err) if err.is_breaker_failure() => permit.record_failure(),
            _ => permit.record_success(),
        }

        result
    }

    /// Ask for admission of one call.
    ///
    /// Settle the returned permit with `record_success` or `record_failure`.
    /// Dropping it unsettled, as happens when the caller's future is
    /// cancelled, gives the admission back without recording an outcome.
    pub fn acquire(&self) -> Result<CallPermit<'_>> {
        let now = self.clock.now();

        let admitted = {
            let mut inner = self.lock();
            self.refresh(&mut inner, now);

            match inner.state {
                CircuitState::Open => Err(ScoringError::CircuitOpen {
                    state: CircuitState::Open,
                    retry_after: inner.expiry.map(|expiry| expiry.saturating_duration_since(now)),
                }),
                CircuitState::HalfOpen
                    if inner.counts.requests >= self.config.half_open_max_calls =>
                {
                    Err(ScoringError::CircuitOpen {
                        state: CircuitState::HalfOpen,
                        retry_after: None,
                    })
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };

        self.report();

        match admitted {
            Ok(generation) => Ok(CallPermit {
                breaker: self,
                generation,
                settled: false,
            }),
            Err(err) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                counter!("fraud_scoring.circuit.rejected", 1, "circuit" => self.name.clone());
                debug!(circuit = %self.name, error = %err, "Call rejected by circuit breaker");
                Err(err)
            }
        }
    }

    /// Current state as last recorded; does not advance timers
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot of the breaker's counters
    pub fn health(&self) -> BreakerHealth {
        let now = self.clock.now();
        let inner = self.lock();
        self.snapshot(&inner, now)
    }

    /// Force the breaker back to Closed with fresh counts
    pub fn reset(&self) {
        let now = self.clock.now();
        {
            let mut inner = self.lock();
            if inner.state == CircuitState::Closed {
                self.new_generation(&mut inner, now);
            } else {
                self.set_state(&mut inner, CircuitState::Closed, now);
            }
        }
        self.report();
    }

    fn record(&self, generation: u64, success: bool) {
        let now = self.clock.now();

        {
            let mut inner = self.lock();
            self.refresh(&mut inner, now);

            if inner.generation != generation {
                debug!(circuit = %self.name, "Discarding outcome from a previous generation");
            } else if success {
                self.on_success(&mut inner, now);
            } else {
                self.on_failure(&mut inner, now);
            }
        }

        self.report();
    }

    /// Hand back an admission whose call never finished
    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.counts.on_release();
            debug!(circuit = %self.name, "Released admission of an abandoned call");
        }
    }

    fn on_success(&self, inner: &mut BreakerInner, now: Instant) {
        inner.counts.on_success();

        if inner.state == CircuitState::HalfOpen
            && inner.counts.consecutive_successes >= self.config.half_open_max_calls
        {
            self.set_state(inner, CircuitState::Closed, now);
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner, now: Instant) {
        inner.counts.on_failure();

        match inner.state {
            CircuitState::Closed => {
                if self.ready_to_trip(&inner.counts) {
                    self.set_state(inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(inner, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.min_requests
            && counts.failure_ratio() >= self.config.failure_threshold
    }

    /// Apply time-based changes: Closed window expiry and Open cool-down
    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        let expired = matches!(inner.expiry, Some(expiry) if now >= expiry);
        if !expired {
            return;
        }

        match inner.state {
            CircuitState::Closed => self.new_generation(inner, now),
            CircuitState::Open => self.set_state(inner, CircuitState::HalfOpen, now),
            CircuitState::HalfOpen => {}
        }
    }

    fn set_state(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.last_transition = now;
        self.new_generation(inner, now);

        let health = self.snapshot(inner, now);
        inner.pending.push(Transition { from, to, health });
    }

    fn new_generation(&self, inner: &mut BreakerInner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => closed_expiry(&self.config, now),
            CircuitState::Open => Some(now + self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn snapshot(&self, inner: &BreakerInner, now: Instant) -> BreakerHealth {
        let retry_after = match inner.state {
            CircuitState::Open => inner.expiry.map(|expiry| expiry.saturating_duration_since(now)),
            _ => None,
        };

        BreakerHealth {
            state: inner.state,
            requests: inner.counts.requests,
            successes: inner.counts.total_successes,
            failures: inner.counts.total_failures,
            consecutive_successes: inner.counts.consecutive_successes,
            consecutive_failures: inner.counts.consecutive_failures,
            time_in_state: now.saturating_duration_since(inner.last_transition),
            retry_after,
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Publish queued transitions once the state lock is released.
    ///
    /// If another thread is already dispatching it picks up our transitions
    /// too, so this returns without waiting. An observer that calls back
    /// into the breaker lands here and returns the same way.
    fn report(&self) {
        loop {
            let dispatch = match self.dispatch.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };

            loop {
                let batch = std::mem::take(&mut self.lock().pending);
                if batch.is_empty() {
                    break;
                }
                for transition in batch {
                    self.publish(transition);
                }
            }

            drop(dispatch);

            // A transition queued between the last drain and the unlock
            // found the dispatcher busy and is still waiting.
            if self.lock().pending.is_empty() {
                return;
            }
        }
    }

    fn publish(&self, Transition { from, to, health }: Transition) {
        match to {
            CircuitState::Open => warn!(
                circuit = %self.name,
                from = %from,
                to = %to,
                open_timeout_ms = %self.config.open_timeout.as_millis(),
                "Circuit breaker changed state"
            ),
            _ => info!(
                circuit = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker changed state"
            ),
        }

        gauge!("fraud_scoring.circuit.state", to.as_gauge(), "circuit" => self.name.clone());

        if let Some(callback) = &self.state_change_callback {
            callback(&self.name, from, to, health);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn closed_expiry(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
    if config.interval.is_zero() {
        None
    } else {
        Some(now + config.interval)
    }
}

/// Admission ticket for one protected call
#[must_use = "a dropped permit releases its admission without recording an outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record(self.generation, true);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record(self.generation, false);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.generation);
        }
    }
}

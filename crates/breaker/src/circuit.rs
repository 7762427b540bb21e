//! Breaker state machine
//!
//! All state lives behind one `std::sync::Mutex`; admission and outcome
//! recording each take it once and never hold it across an await. Every
//! state change starts a new generation, and outcomes from an older
//! generation are dropped, so a slow call admitted before a transition cannot
//! skew the counts of the next state.
//!
//! Transitions:
//! - Closed → Open (failures in the current window reach `max_requests`)
//! - Open → HalfOpen (`timeout` elapsed, evaluated lazily)
//! - HalfOpen → Open (any failed trial)
//! - HalfOpen → Closed (`max_requests` consecutive successful trials)

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::{AnyError, FailureClassifier};
use crate::error::{Error, Result};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    /// Status label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Request and outcome counters of the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
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
}

/// Breaker configuration.
#[derive(Clone)]
pub struct BreakerSettings {
    pub name: String,
    /// Failures that open the breaker, and trial calls allowed in HalfOpen
    pub max_requests: u32,
    /// Length of the Closed-state failure window; zero never resets
    pub interval: Duration,
    /// Time spent Open before trial calls are admitted
    pub timeout: Duration,
    pub classifier: Arc<dyn FailureClassifier>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "daichi_api_breaker".to_string(),
            max_requests: 5,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            classifier: Arc::new(AnyError),
        }
    }
}

impl fmt::Debug for BreakerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BreakerSettings {
    /// Default settings under another name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn classifier(mut self, classifier: impl FailureClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::InvalidSettings(
                "max_requests must be greater than 0".into(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidSettings("name must not be empty".into()));
        }
        Ok(())
    }
}

struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    /// End of the Closed window or of the Open period
    expiry: Option<Instant>,
}

/// Three-state circuit breaker shared by all callers of a client.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

/// Permission to make one call, obtained from `CircuitBreaker::allow`.
///
/// Report the result with `success` or `failure`. Dropping it unreported
/// (a cancelled call) gives the admission slot back without counting.
#[must_use = "report the call outcome with success() or failure()"]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    reported: bool,
}

impl Admission<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, false);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, true);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release(self.generation);
        }
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Result<Self> {
        settings.validate()?;
        let now = Instant::now();
        let breaker = Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: window_end(&settings, State::Closed, now),
            }),
            settings,
        };
        info!(
            breaker = %breaker.settings.name,
            max_requests = breaker.settings.max_requests,
            interval_ms = breaker.settings.interval.as_millis() as u64,
            timeout_ms = breaker.settings.timeout.as_millis() as u64,
            "circuit breaker initialized"
        );
        Ok(breaker)
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &dyn FailureClassifier {
        self.settings.classifier.as_ref()
    }

    /// Current state, with elapsed windows and timeouts applied.
    pub fn state(&self) -> State {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Counters of the current generation.
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    /// Admission check. Rejects with `CircuitOpen` while Open, and in
    /// HalfOpen once `max_requests` trials are in flight or done.
    pub fn allow(&self) -> transport::Result<Admission<'_>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        let rejected = match inner.state {
            State::Closed => false,
            State::Open => true,
            State::HalfOpen => inner.counts.requests >= self.settings.max_requests,
        };
        if rejected {
            debug!(breaker = %self.settings.name, state = %inner.state, "call rejected");
            crate::metrics::record_rejection(&self.settings.name);
            return Err(transport::Error::CircuitOpen(self.settings.name.clone()));
        }

        inner.counts.requests = inner.counts.requests.saturating_add(1);
        Ok(Admission {
            breaker: self,
            generation: inner.generation,
            reported: false,
        })
    }

    fn record(&self, generation: u64, failed: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match (inner.state, failed) {
            (State::Closed, false) => inner.counts.on_success(),
            (State::Closed, true) => {
                inner.counts.on_failure();
                if inner.counts.total_failures >= self.settings.max_requests {
                    self.transition(&mut inner, State::Open, now);
                }
            }
            (State::HalfOpen, false) => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.settings.max_requests {
                    self.transition(&mut inner, State::Closed, now);
                }
            }
            (State::HalfOpen, true) => self.transition(&mut inner, State::Open, now),
            // Admissions never happen while Open, so a same-generation
            // outcome cannot arrive here
            (State::Open, _) => {}
        }
    }

    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
        }
    }

    /// Apply an elapsed Closed window or Open timeout.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            State::Closed if expired => self.new_generation(inner, now),
            State::Open if expired => self.transition(inner, State::HalfOpen, now),
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: State, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);

        let name = &self.settings.name;
        match to {
            State::Open => warn!(breaker = %name, %from, %to, "circuit breaker opened"),
            _ => info!(breaker = %name, %from, %to, "circuit breaker state changed"),
        }
        crate::metrics::record_transition(name, from, to);
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = window_end(&self.settings, inner.state, now);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay consistent even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// End of the window entered at `now`. `None` never expires, which also
/// covers durations too large to represent.
fn window_end(settings: &BreakerSettings, state: State, now: Instant) -> Option<Instant> {
    match state {
        State::Closed if settings.interval.is_zero() => None,
        State::Closed => now.checked_add(settings.interval),
        State::Open => now.checked_add(settings.timeout),
        State::HalfOpen => None,
    }
}

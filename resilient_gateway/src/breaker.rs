//! # Circuit Breaker Gate
//!
//! Named circuits guarding upstream reads. Callers ask for permission with
//! [`CircuitBreakerRegistry::attempt`]; an allowed call carries a [`Permit`]
//! that must be resolved with the call's outcome.
//!
//! ```text
//! Closed    → Open:      consecutive failures reach the threshold
//! Open      → Half-Open: first attempt after the open timeout
//! Half-Open → Closed:    enough probe successes
//! Half-Open → Open:      any probe failure
//! ```

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::settings::CircuitBreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through and outcomes are recorded
    Closed,
    /// Calls are rejected without contacting upstream
    Open,
    /// A limited number of probes decide whether to close or re-open
    HalfOpen,
}

/// Thresholds driving state transitions
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

impl From<&CircuitBreakerConfig> for BreakerPolicy {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            half_open_max_calls: config.half_open_max_calls,
        }
    }
}

/// Counters exposed for health reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub ignored_count: u64,
    pub rejected_count: u64,
    pub consecutive_failures: u32,
}

/// Point-in-time view of one circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub metrics: CircuitMetrics,
}

/// Answer to a permission request
#[derive(Debug)]
pub enum Permission {
    Allowed(Permit),
    Denied,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Bumped on every transition so stale permits cannot move the state
    generation: u64,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    half_open_successes: u32,
    metrics: CircuitMetrics,
}

/// A single named circuit
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        let name = name.into();
        info!(
            circuit = %name,
            failure_threshold = policy.failure_threshold,
            open_timeout_ms = policy.open_timeout.as_millis() as u64,
            half_open_max_calls = policy.half_open_max_calls,
            "Circuit breaker initialized"
        );

        Self {
            name,
            policy,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                opened_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
                metrics: CircuitMetrics::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to place one call through this circuit
    pub fn attempt(self: &Arc<Self>) -> Permission {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed() >= self.policy.open_timeout)
                .unwrap_or(true);
            if elapsed {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }

        let allowed = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.policy.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        };

        if !allowed {
            inner.metrics.rejected_count += 1;
            debug!(circuit = %self.name, state = ?inner.state, "Call not permitted");
            return Permission::Denied;
        }

        Permission::Allowed(Permit {
            breaker: Arc::clone(self),
            generation: inner.generation,
            issued_in: inner.state,
            resolved: false,
        })
    }

    fn on_success(&self, generation: u64, issued_in: CircuitState) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;

        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.metrics.consecutive_failures = 0,
            CircuitState::HalfOpen if issued_in == CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.policy.half_open_max_calls {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;

        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.metrics.consecutive_failures += 1;
                if inner.metrics.consecutive_failures >= self.policy.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn on_ignored(&self, generation: u64, issued_in: CircuitState) {
        let mut inner = self.inner.lock();
        inner.metrics.ignored_count += 1;

        if inner.generation == generation
            && inner.state == CircuitState::HalfOpen
            && issued_in == CircuitState::HalfOpen
        {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.half_open_in_flight = 0;
        inner.half_open_successes = 0;

        match to {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                error!(
                    circuit = %self.name,
                    from = ?from,
                    consecutive_failures = inner.metrics.consecutive_failures,
                    open_timeout_ms = self.policy.open_timeout.as_millis() as u64,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                info!(circuit = %self.name, "Circuit breaker half-open, probing upstream");
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.metrics.consecutive_failures = 0;
                info!(circuit = %self.name, from = ?from, "Circuit breaker closed");
            }
        }
    }

    /// Reject all calls until the open timeout elapses
    pub fn force_open(&self) {
        warn!(circuit = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    pub fn force_closed(&self) {
        warn!(circuit = %self.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn metrics(&self) -> CircuitMetrics {
        self.inner.lock().metrics.clone()
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            metrics: inner.metrics.clone(),
        }
    }
}

/// Proof of permission for one call; resolve it with the call's outcome.
///
/// Dropping an unresolved permit is the same as [`Permit::ignore`].
#[derive(Debug)]
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    issued_in: CircuitState,
    resolved: bool,
}

impl Permit {
    pub fn circuit(&self) -> &str {
        self.breaker.name()
    }

    pub fn record_success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.generation, self.issued_in);
    }

    pub fn record_failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.generation);
    }

    /// The call finished with an outcome the breaker does not count
    pub fn ignore(mut self) {
        self.resolved = true;
        self.breaker.on_ignored(self.generation, self.issued_in);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.on_ignored(self.generation, self.issued_in);
        }
    }
}

/// Lazily created circuits keyed by name, all sharing one policy
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    policy: BreakerPolicy,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            breakers: DashMap::new(),
        }
    }

    /// The circuit called `name`, created on first use
    pub fn circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.policy.clone())))
            .value()
            .clone()
    }

    pub fn attempt(&self, name: &str) -> Permission {
        self.circuit_breaker(name).attempt()
    }

    /// Snapshots of every circuit created so far, sorted by name
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

// src/adapter/circuit.rs
// ============================================================================
// Module: Adapter Circuit Breaker
// Description: Process-wide, per-endpoint circuit breaker for the external
//              reasoning/communication adapters.
// Purpose: Stop hammering an unreachable backend and allow a single probe
//          request once its cooldown elapses.
// Dependencies: std::sync, std::time
// ============================================================================

//! ## Overview
//! A Closed/HalfOpen/Open state machine keyed by endpoint (base URL)
//! rather than by worker id, tracked with a sliding failure window rather
//! than a bare consecutive-failure counter. One [`CircuitRegistry`] entry
//! is shared by every call against the same endpoint within the process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use std::time::Instant;

use crate::config::CircuitConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests are allowed through.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// A single probe request is allowed through to test recovery.
    HalfOpen,
}

/// Per-endpoint circuit breaker statistics.
#[derive(Debug)]
pub struct CircuitStats {
    /// Current state.
    state: CircuitState,
    /// Timestamps of failures within the sliding window.
    failure_timestamps: Vec<Instant>,
    /// When the circuit opened, used to gate the cooldown.
    opened_at: Option<Instant>,
    /// Whether a half-open probe is currently in flight.
    probe_in_flight: bool,
}

impl CircuitStats {
    /// Creates a closed circuit with no recorded failures.
    #[must_use]
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_timestamps: Vec::new(),
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns `true` when a call may proceed: the circuit is closed, or
    /// half-open with no probe currently in flight. Reserves the probe slot
    /// as a side effect when it grants a half-open attempt.
    pub fn try_acquire(&mut self, config: &CircuitConfig) -> bool {
        self.maybe_transition_to_half_open(config);
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
            CircuitState::Open => false,
        }
    }

    /// Records a successful call, closing the circuit and clearing the
    /// failure window.
    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_timestamps.clear();
        self.opened_at = None;
        self.probe_in_flight = false;
    }

    /// Records a failed call, opening the circuit once the sliding-window
    /// failure count reaches `config.failures_threshold`. A failure while
    /// half-open reopens the circuit immediately.
    pub fn record_failure(&mut self, config: &CircuitConfig) {
        let now = Instant::now();
        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
            self.open(now);
            return;
        }
        self.failure_timestamps.push(now);
        self.prune_window(config.window(), now);
        if self.failure_timestamps.len() as u32 >= config.failures_threshold {
            self.open(now);
        }
    }

    /// Transitions to the `Open` state at `now`.
    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    /// Transitions `Open` to `HalfOpen` once the cooldown has elapsed.
    fn maybe_transition_to_half_open(&mut self, config: &CircuitConfig) {
        if self.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = self.opened_at else {
            return;
        };
        if opened_at.elapsed() >= config.cooldown() {
            self.state = CircuitState::HalfOpen;
            self.probe_in_flight = false;
        }
    }

    /// Drops failure timestamps older than `window` relative to `now`.
    fn prune_window(&mut self, window: Duration, now: Instant) {
        self.failure_timestamps.retain(|ts| now.duration_since(*ts) <= window);
    }
}

/// Process-wide registry of circuit breakers, one per endpoint key (the
/// adapter's base URL).
static REGISTRY: OnceLock<Mutex<HashMap<String, Mutex<CircuitStats>>>> = OnceLock::new();

/// Returns the process-wide registry, initializing it on first use.
fn registry() -> &'static Mutex<HashMap<String, Mutex<CircuitStats>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Runs `body` while holding the named endpoint's circuit breaker. Returns
/// `Err(CircuitOpenError)` without running `body` when the circuit rejects
/// the call.
pub fn with_circuit<T, E>(
    endpoint: &str,
    config: &CircuitConfig,
    body: impl FnOnce() -> Result<T, E>,
) -> Result<Result<T, E>, CircuitOpenError> {
    if !try_acquire(endpoint, config) {
        return Err(CircuitOpenError);
    }
    let outcome = body();
    record_call_outcome(endpoint, config, outcome.is_ok());
    Ok(outcome)
}

/// Attempts to acquire `endpoint`'s circuit for a call the caller will run
/// itself (for example an `async` HTTP request), returning `false` when the
/// call must not be attempted. Callers that acquire must report the result
/// via [`record_call_outcome`].
#[must_use]
pub fn try_acquire(endpoint: &str, config: &CircuitConfig) -> bool {
    let registry = registry();
    ensure_entry(registry, endpoint);
    acquire(registry, endpoint, config)
}

/// Records the outcome of a call previously granted by [`try_acquire`].
pub fn record_call_outcome(endpoint: &str, config: &CircuitConfig, succeeded: bool) {
    record_outcome(registry(), endpoint, config, succeeded);
}

/// Attempts to acquire the circuit for `endpoint`, returning `false` when
/// the call should be rejected.
fn acquire(registry: &Mutex<HashMap<String, Mutex<CircuitStats>>>, endpoint: &str, config: &CircuitConfig) -> bool {
    let map = registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    match map.get(endpoint) {
        Some(stats) => stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).try_acquire(config),
        None => true,
    }
}

/// Records the outcome of a call against `endpoint`'s circuit.
fn record_outcome(
    registry: &Mutex<HashMap<String, Mutex<CircuitStats>>>,
    endpoint: &str,
    config: &CircuitConfig,
    succeeded: bool,
) {
    let map = registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(stats) = map.get(endpoint) {
        let mut stats = stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if succeeded {
            stats.record_success();
        } else {
            stats.record_failure(config);
        }
    }
}

/// Ensures `endpoint` has a registry entry, inserting a fresh closed
/// circuit if absent.
fn ensure_entry(registry: &Mutex<HashMap<String, Mutex<CircuitStats>>>, endpoint: &str) {
    let mut map = registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    map.entry(endpoint.to_string()).or_insert_with(|| Mutex::new(CircuitStats::new()));
}

/// Returned when a call is rejected because its endpoint's circuit is open
/// (or half-open with a probe already in flight).
#[derive(Debug, Clone, Copy)]
pub struct CircuitOpenError;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitConfig {
        CircuitConfig {
            failures_threshold: 2,
            cooldown_ms: 20,
            window_ms: 10_000,
        }
    }

    #[test]
    fn opens_after_threshold_failures_then_rejects() {
        let endpoint = "https://circuit-test-one.invalid";
        let config = test_config();
        for _ in 0..2 {
            let _ = with_circuit::<(), ()>(endpoint, &config, || Err(()));
        }
        let result = with_circuit::<(), ()>(endpoint, &config, || Ok(()));
        assert!(result.is_err(), "circuit should reject while open");
    }

    #[test]
    fn half_open_probe_succeeds_and_closes_circuit() {
        let endpoint = "https://circuit-test-two.invalid";
        let config = test_config();
        for _ in 0..2 {
            let _ = with_circuit::<(), ()>(endpoint, &config, || Err(()));
        }
        std::thread::sleep(Duration::from_millis(30));
        let result = with_circuit::<(), ()>(endpoint, &config, || Ok(()));
        assert!(result.is_ok(), "half-open probe should be allowed after cooldown");
        let result = with_circuit::<(), ()>(endpoint, &config, || Ok(()));
        assert!(result.is_ok(), "circuit should be closed after a successful probe");
    }

    #[test]
    fn success_resets_failure_window() {
        let endpoint = "https://circuit-test-three.invalid";
        let config = test_config();
        let _ = with_circuit::<(), ()>(endpoint, &config, || Err(()));
        let _ = with_circuit::<(), ()>(endpoint, &config, || Ok(()));
        let result = with_circuit::<(), ()>(endpoint, &config, || Err(()));
        assert!(result.is_ok(), "single post-reset failure should not open the circuit");
    }
}

//! Per-service circuit breakers.
//!
//! One state machine per named upstream service. A breaker is Closed
//! (calls pass through) until the count of failures inside the reset
//! window reaches a threshold, at which point it Opens and every call
//! short-circuits to fallback. It Closes again automatically once the
//! cool-down elapses (there is no half-open probe state; the gate is
//! purely time-based), and reopening clears the failure history
//! entirely.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::result::now_millis;
use crate::telemetry::{self, PipelineEvent};

/// Tuning for all breakers. Thresholds are uniform across services.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Failures within the window before the breaker opens.
    pub max_errors: usize,
    /// Sliding failure window, and the open-state cool-down.
    pub reset_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_errors: crate::constants::DEFAULT_BREAKER_MAX_ERRORS,
            reset_window: Duration::from_secs(crate::constants::DEFAULT_BREAKER_RESET_WINDOW_SECS),
        }
    }
}

/// Failure history and open/closed state for one service.
#[derive(Debug, Default)]
struct ServiceState {
    /// Timestamps of recent failures, oldest first.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Wall-clock time of the most recent failure, for stats.
    last_error_millis: Option<u64>,
}

impl ServiceState {
    /// Drop failures older than the window.
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Point-in-time stats for one service, as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub error_count: usize,
    pub circuit_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_millis: Option<u64>,
}

/// Registry of per-service circuit breakers.
///
/// All state lives behind one mutex so that recording a failure and
/// flipping to Open are a single atomic step: concurrent failures on
/// the same service can neither under- nor over-trip the breaker. The
/// lock is never held across an await point.
pub struct CircuitBreaker {
    services: Mutex<HashMap<String, ServiceState>>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls to `service` should short-circuit right now.
    ///
    /// Also performs the automatic Open → Closed transition: once the
    /// cool-down has elapsed the breaker closes and the failure
    /// history is cleared (full reset, not decay).
    pub fn is_open(&self, service: &str) -> bool {
        let mut services = self.services.lock().expect("breaker lock poisoned");
        let Some(state) = services.get_mut(service) else {
            return false;
        };
        match state.opened_at {
            Some(opened_at) => {
                if opened_at.elapsed() > self.config.reset_window {
                    state.opened_at = None;
                    state.failures.clear();
                    telemetry::emit(PipelineEvent::CircuitClosed { service });
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Record one failure against `service`; opens the breaker when
    /// the windowed count reaches the threshold.
    pub fn record_failure(&self, service: &str) {
        let now = Instant::now();
        let mut services = self.services.lock().expect("breaker lock poisoned");
        let state = services.entry(service.to_string()).or_default();
        state.prune(self.config.reset_window, now);
        state.failures.push_back(now);
        state.last_error_millis = Some(now_millis());
        if state.opened_at.is_none() && state.failures.len() >= self.config.max_errors {
            state.opened_at = Some(now);
            telemetry::emit(PipelineEvent::CircuitOpened {
                service,
                failures: state.failures.len(),
            });
        }
    }

    /// Manually reset one service, or all of them.
    pub fn reset(&self, service: Option<&str>) {
        let mut services = self.services.lock().expect("breaker lock poisoned");
        match service {
            Some(name) => {
                if let Some(state) = services.get_mut(name) {
                    state.failures.clear();
                    state.opened_at = None;
                    telemetry::emit(PipelineEvent::CircuitReset { service: name });
                }
            }
            None => {
                for (name, state) in services.iter_mut() {
                    state.failures.clear();
                    state.opened_at = None;
                    telemetry::emit(PipelineEvent::CircuitReset { service: name });
                }
            }
        }
    }

    /// Current stats per service, pruned to the window.
    pub fn stats(&self) -> BTreeMap<String, ServiceStats> {
        let now = Instant::now();
        let mut services = self.services.lock().expect("breaker lock poisoned");
        services
            .iter_mut()
            .map(|(name, state)| {
                state.prune(self.config.reset_window, now);
                let open = state
                    .opened_at
                    .is_some_and(|t| t.elapsed() <= self.config.reset_window);
                (
                    name.clone(),
                    ServiceStats {
                        error_count: state.failures.len(),
                        circuit_open: open,
                        last_error_millis: state.last_error_millis,
                    },
                )
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

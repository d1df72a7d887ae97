//! Per-provider circuit breaker: after a run of consecutive failures, stop
//! attempting calls for a cooldown window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
}

/// Tracks one breaker per provider name behind a single mutex -- call volume
/// is low enough (one call per worker step) that a per-provider lock buys
/// nothing.
pub struct CircuitBreakerRegistry {
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if calls to `provider` are currently permitted.
    pub fn is_call_allowed(&self, provider: &str) -> bool {
        let mut states = self.states.lock().unwrap();
        match states.get(provider) {
            None | Some(BreakerState::Closed { .. }) => true,
            Some(BreakerState::Open { opened_at }) => {
                if opened_at.elapsed() >= COOLDOWN {
                    states.insert(provider.to_string(), BreakerState::Closed { consecutive_failures: 0 });
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.lock().unwrap();
        states.insert(provider.to_string(), BreakerState::Closed { consecutive_failures: 0 });
    }

    pub fn record_failure(&self, provider: &str) {
        let mut states = self.states.lock().unwrap();
        let next = match states.get(provider) {
            Some(BreakerState::Closed { consecutive_failures }) => {
                let failures = consecutive_failures + 1;
                if failures >= FAILURE_THRESHOLD {
                    BreakerState::Open { opened_at: Instant::now() }
                } else {
                    BreakerState::Closed { consecutive_failures: failures }
                }
            }
            Some(BreakerState::Open { opened_at }) => BreakerState::Open { opened_at: *opened_at },
            None => BreakerState::Closed { consecutive_failures: 1 },
        };
        states.insert(provider.to_string(), next);
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_allows_calls() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.is_call_allowed("anthropic"));
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let registry = CircuitBreakerRegistry::new();
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure("anthropic");
        }
        assert!(!registry.is_call_allowed("anthropic"));
    }

    #[test]
    fn success_resets_failure_count() {
        let registry = CircuitBreakerRegistry::new();
        for _ in 0..FAILURE_THRESHOLD - 1 {
            registry.record_failure("anthropic");
        }
        registry.record_success("anthropic");
        registry.record_failure("anthropic");
        assert!(registry.is_call_allowed("anthropic"));
    }

    #[test]
    fn breaker_state_is_per_provider() {
        let registry = CircuitBreakerRegistry::new();
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure("anthropic");
        }
        assert!(!registry.is_call_allowed("anthropic"));
        assert!(registry.is_call_allowed("openai"));
    }
}

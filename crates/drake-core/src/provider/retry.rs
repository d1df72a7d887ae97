//! Exponential backoff with jitter for provider calls.
//!
//! Fixed policy: initial delay 1s, multiplier 2.0, max delay 30s, up to 4
//! attempts total, jitter applied as +/-25% of the computed delay. A
//! `Retry-After` value reported by the provider overrides the computed delay
//! for that attempt.

use std::time::Duration;

use rand::Rng;

use super::ProviderError;

pub const MAX_ATTEMPTS: u32 = 4;
const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MULTIPLIER: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(30);
const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay before attempt number `attempt` (1-indexed: the
    /// delay before the *second* call is `delay_for(1)`), honoring an
    /// explicit `Retry-After` hint when present.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs);
        }
        let base = INITIAL_DELAY.as_secs_f64() * MULTIPLIER.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(MAX_DELAY.as_secs_f64());
        let jittered = apply_jitter(capped);
        Duration::from_secs_f64(jittered)
    }

    pub fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        matches!(error, ProviderError::RateLimited { .. } | ProviderError::Request { .. })
    }
}

fn apply_jitter(base: f64) -> f64 {
    let mut rng = rand::rng();
    let jitter = rng.random_range(-JITTER_FRACTION..=JITTER_FRACTION);
    (base * (1.0 + jitter)).max(0.0)
}

/// Runs `f` up to `policy.max_attempts` times, sleeping between attempts per
/// [`RetryPolicy::delay_for`].
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(attempt, &err) {
                    return Err(err);
                }
                let retry_after = match &err {
                    ProviderError::RateLimited { retry_after_secs, .. } => *retry_after_secs,
                    _ => None,
                };
                tokio::time::sleep(policy.delay_for(attempt, retry_after)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_within_jitter_band() {
        let policy = RetryPolicy::default();
        let d1 = policy.delay_for(1, None).as_secs_f64();
        let d2 = policy.delay_for(2, None).as_secs_f64();
        // attempt 1 base = 1s +/-25%, attempt 2 base = 2s +/-25%
        assert!(d1 >= 0.75 && d1 <= 1.25, "d1 = {d1}");
        assert!(d2 >= 1.5 && d2 <= 2.5, "d2 = {d2}");
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for(10, None).as_secs_f64();
        assert!(d <= 30.0 * 1.25);
    }

    #[test]
    fn retry_after_header_overrides_computed_delay() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for(1, Some(5));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy::default();
        let err = ProviderError::RateLimited {
            provider: "anthropic".into(),
            retry_after_secs: None,
        };
        assert!(policy.should_retry(3, &err));
        assert!(!policy.should_retry(4, &err));
    }

    #[test]
    fn should_retry_refuses_circuit_open() {
        let policy = RetryPolicy::default();
        let err = ProviderError::CircuitOpen("anthropic".into());
        assert!(!policy.should_retry(1, &err));
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy { max_attempts: 4 };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(&policy, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Request {
                        provider: "anthropic".into(),
                        message: "timeout".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}

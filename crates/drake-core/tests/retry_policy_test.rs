use drake_core::provider::retry::{with_retry, RetryPolicy, MAX_ATTEMPTS};
use drake_core::provider::ProviderError;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let policy = RetryPolicy::default();
    let attempts = AtomicU32::new(0);
    let result: Result<(), ProviderError> = with_retry(&policy, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async {
            Err(ProviderError::Request {
                provider: "anthropic".into(),
                message: "down".into(),
            })
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
}

use drake_core::provider::circuit_breaker::CircuitBreakerRegistry;

#[test]
fn repeated_failures_trip_the_breaker_for_one_provider_only() {
    let registry = CircuitBreakerRegistry::new();
    for _ in 0..5 {
        registry.record_failure("anthropic");
    }
    assert!(!registry.is_call_allowed("anthropic"));
    assert!(registry.is_call_allowed("openai"));
}

//! Property-based tests for the retry policy
//!
//! Tests invariants:
//! - Delay for attempt k is base * 2^(k-1) when uncapped
//! - Delays never decrease and never exceed the cap
//! - Never retries at or beyond max attempts
//! - Permanent errors are never retried

use proptest::prelude::*;
use std::time::Duration;

use crate::core::flow::{GenerationError, RetryDecision, RetryPolicy};

fn arb_base_ms() -> impl Strategy<Value = u64> {
    1u64..5_000
}

fn arb_transient() -> impl Strategy<Value = GenerationError> {
    prop_oneof![
        Just(GenerationError::timeout()),
        Just(GenerationError::rate_limited()),
        (500u16..600).prop_map(|status| GenerationError::from_status(status, "upstream")),
    ]
}

proptest! {
    #[test]
    fn delay_doubles_per_attempt(base_ms in arb_base_ms(), attempt in 1u32..16) {
        let policy = RetryPolicy::new(Duration::from_millis(base_ms), 20);
        let expected = Duration::from_millis(base_ms) * 2u32.pow(attempt - 1);
        prop_assert_eq!(policy.next_delay(attempt), expected);
    }

    #[test]
    fn delays_are_monotonic_and_capped(
        base_ms in arb_base_ms(),
        cap_ms in 1u64..60_000,
        max_attempts in 1u32..40,
    ) {
        let cap = Duration::from_millis(cap_ms);
        let policy = RetryPolicy::new(Duration::from_millis(base_ms), max_attempts)
            .with_max_delay(cap);

        let schedule = policy.schedule();
        prop_assert_eq!(schedule.len(), (max_attempts - 1) as usize);
        for pair in schedule.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        prop_assert!(schedule.iter().all(|d| *d <= cap));
    }

    #[test]
    fn never_retries_past_max_attempts(
        max_attempts in 1u32..10,
        attempt in 1u32..20,
        error in arb_transient(),
    ) {
        let policy = RetryPolicy::new(Duration::from_secs(1), max_attempts);
        let decision = policy.decide(attempt, &error);
        if attempt >= max_attempts {
            prop_assert_eq!(decision, RetryDecision::Exhausted);
        } else {
            prop_assert_eq!(decision, RetryDecision::RetryAfter(policy.next_delay(attempt)));
        }
    }

    #[test]
    fn permanent_errors_are_not_retried(attempt in 1u32..10, status in 400u16..500) {
        prop_assume!(status != 408 && status != 429);
        let error = GenerationError::from_status(status, "client error");
        prop_assert_eq!(
            RetryPolicy::default().decide(attempt, &error),
            RetryDecision::NotRetryable
        );
    }
}

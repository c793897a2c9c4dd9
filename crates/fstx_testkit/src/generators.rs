//! Property-based test generators using proptest.

use crate::fixtures::Outcome;
use proptest::prelude::*;

/// Strategy for attempt limits a backend might be configured with.
pub fn attempts_strategy() -> impl Strategy<Value = u32> {
    1u32..=6
}

/// Strategy for a single retryable outcome: success or a transient failure.
pub fn retryable_outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Ok),
        "[a-z ]{1,16}".prop_map(Outcome::Fail),
    ]
}

/// Strategy for a terminal outcome: cancellation or deadline expiry.
pub fn cancellation_outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Cancelled), Just(Outcome::DeadlineExceeded)]
}

/// Strategy for a script of outcomes that never cancels.
pub fn retryable_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<Outcome>> {
    prop::collection::vec(retryable_outcome_strategy(), 0..=max_len)
}

/// Strategy for a script of transient failures, possibly interrupted by one
/// cancellation somewhere inside it.
pub fn interrupted_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<Outcome>> {
    (
        prop::collection::vec("[a-z]{1,8}".prop_map(Outcome::Fail), 1..=max_len.max(1)),
        cancellation_outcome_strategy(),
        any::<prop::sample::Index>(),
    )
        .prop_map(|(mut script, cancel, at)| {
            let at = at.index(script.len());
            script[at] = cancel;
            script
        })
}

/// Number of calls a retry loop makes for `script` given `max_attempts`, and
/// whether the loop ends in success.
///
/// Mirrors the lifecycle rule: stop on the first success or cancellation,
/// otherwise run until the attempts are used up. Calls past the end of the
/// script succeed.
pub fn expected_calls(script: &[Outcome], max_attempts: u32) -> (u32, bool) {
    for n in 1..=max_attempts {
        match script.get(n as usize - 1) {
            None | Some(Outcome::Ok) => return (n, true),
            Some(Outcome::Cancelled) | Some(Outcome::DeadlineExceeded) => return (n, false),
            Some(Outcome::Fail(_)) => {}
        }
    }
    (max_attempts, false)
}

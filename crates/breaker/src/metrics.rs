//! Breaker metrics
//!
//! - `breaker_state_transitions_total` (counter): labels `breaker`, `from`, `to`
//! - `breaker_rejections_total` (counter): label `breaker`
//!
//! Without an installed recorder these calls are no-ops.

use crate::circuit::State;

/// Record a state change of the named breaker.
pub fn record_transition(breaker: &str, from: State, to: State) {
    metrics::counter!(
        "breaker_state_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.label(),
        "to" => to.label()
    )
    .increment(1);
}

/// Record a call rejected without reaching the backend.
pub fn record_rejection(breaker: &str) {
    metrics::counter!("breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

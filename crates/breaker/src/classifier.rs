//! Failure classification
//!
//! Decides which call outcomes count against the breaker. Callers can keep
//! expected errors (a deliberate 404 probe, say) from tripping it.

use reqwest::StatusCode;
use transport::Error;

/// Result of a call that went through the breaker.
#[derive(Debug)]
pub enum Outcome<'a> {
    /// The wrapped transport returned a response with this status.
    Response(StatusCode),
    Error(&'a Error),
}

/// Classifies a call outcome as a tripping failure.
pub trait FailureClassifier: Send + Sync {
    fn is_failure(&self, outcome: &Outcome<'_>) -> bool;
}

/// Every error is a failure, every response a success.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyError;

impl FailureClassifier for AnyError {
    fn is_failure(&self, outcome: &Outcome<'_>) -> bool {
        matches!(outcome, Outcome::Error(_))
    }
}

impl<F> FailureClassifier for F
where
    F: Fn(&Outcome<'_>) -> bool + Send + Sync,
{
    fn is_failure(&self, outcome: &Outcome<'_>) -> bool {
        self(outcome)
    }
}

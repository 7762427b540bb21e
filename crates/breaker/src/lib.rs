//! Circuit breaker for the Daichi cloud client
//!
//! Gates outbound calls so a degraded backend is not hammered while it
//! recovers. `CircuitBreaker` holds the state machine; `BreakerTransport`
//! puts it in front of any `transport::Transport`.
//!
//! State lifecycle:
//! 1. Closed: calls pass, failures are counted per `interval` window
//! 2. `max_requests` failures in a window → Open, calls rejected outright
//! 3. `timeout` after opening → HalfOpen, up to `max_requests` trial calls
//! 4. A failed trial → Open again; `max_requests` successful trials → Closed

pub mod breaker_transport;
pub mod circuit;
pub mod classifier;
pub mod error;
pub mod metrics;

pub use breaker_transport::BreakerTransport;
pub use circuit::{Admission, BreakerSettings, CircuitBreaker, Counts, State};
pub use classifier::{AnyError, FailureClassifier, Outcome};
pub use error::{Error, Result};

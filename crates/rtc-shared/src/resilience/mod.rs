//! Circuit breaker primitives shared by every component that guards an
//! outbound call.

mod behavior;
mod circuit_breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::CircuitState;
pub use metrics::CircuitBreakerMetrics;

//! Resilience for calls to the scoring engine
//!
//! - `CircuitBreaker`: fails fast once the engine looks unhealthy
//! - `Clock`: injectable time source so breaker timing can be driven in tests

mod circuit_breaker;
mod clock;

pub use circuit_breaker::{
    BreakerHealth, CallPermit, CircuitBreaker, CircuitBreakerConfig, StateChangeCallback,
};
pub use clock::{Clock, ManualClock, SystemClock};

use serde::{Deserialize, Serialize};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Engine considered down, calls are rejected
    Open,
    /// Probing recovery with a bounded number of trial calls
    HalfOpen,
}

impl CircuitState {
    /// Numeric value published on the state gauge
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF-OPEN"),
        }
    }
}

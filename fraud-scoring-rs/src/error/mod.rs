//! Error handling for the fraud scoring pipeline
//!
//! Errors are split by where they originate:
//! - engine failures (unavailable, timeout, malformed or declined responses),
//!   all of which count against the circuit breaker
//! - breaker short-circuits, which do not
//! - validation and configuration problems raised before any call is made
//!
//! `PipelineError` wraps whichever of these ended an evaluation.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::CircuitState;

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Main error type for scoring operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Malformed inbound transaction
    #[error("Validation error: {0}")]
    Validation(String),

    /// Engine could not be reached, failed to start or exited non-zero
    #[error("Scoring engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Engine did not answer within the configured bound
    #[error("Scoring engine timed out after {}ms", .0.as_millis())]
    EngineTimeout(Duration),

    /// Engine output could not be turned into a valid response
    #[error("Malformed scoring engine response: {0}")]
    EngineMalformedResponse(String),

    /// Engine answered with an explicit error instead of a score
    #[error("Scoring engine declined to score: {0}")]
    EngineDeclined(String),

    /// Call rejected by the circuit breaker without reaching the engine
    #[error("Circuit breaker {state}: {}", format_retry_after(.retry_after))]
    CircuitOpen {
        state: CircuitState,
        retry_after: Option<Duration>,
    },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(remaining) => format!("rejecting calls for another {}ms", remaining.as_millis()),
        None => "trial call limit reached".to_string(),
    }
}

impl ScoringError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ScoringError::Validation(message.into())
    }

    /// Create an engine unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        ScoringError::EngineUnavailable(message.into())
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        ScoringError::EngineMalformedResponse(message.into())
    }

    /// Create an engine declined error
    pub fn declined(message: impl Into<String>) -> Self {
        ScoringError::EngineDeclined(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ScoringError::Configuration(message.into())
    }

    /// Whether the circuit breaker records this error as a failed call
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            ScoringError::EngineUnavailable(_)
                | ScoringError::EngineTimeout(_)
                | ScoringError::EngineMalformedResponse(_)
                | ScoringError::EngineDeclined(_)
        )
    }

    /// Whether the call was short-circuited by the breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ScoringError::CircuitOpen { .. })
    }

    /// Short machine-readable label, used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Validation(_) => "validation",
            ScoringError::EngineUnavailable(_) => "engine_unavailable",
            ScoringError::EngineTimeout(_) => "engine_timeout",
            ScoringError::EngineMalformedResponse(_) => "engine_malformed_response",
            ScoringError::EngineDeclined(_) => "engine_declined",
            ScoringError::CircuitOpen { .. } => "circuit_open",
            ScoringError::Configuration(_) => "configuration",
        }
    }
}

/// Failure of a single `ScoringPipeline::evaluate` call.
///
/// The caller's transaction is never touched on failure, so it keeps its
/// `pending` status.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineError {
    /// Identifier of the transaction being scored
    pub transaction_id: String,

    /// What went wrong
    pub cause: ScoringError,
}

impl PipelineError {
    pub fn new(transaction_id: impl Into<String>, cause: ScoringError) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            cause,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scoring failed for transaction {}: {}", self.transaction_id, self.cause)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Convert serde_json errors to ScoringError
impl From<serde_json::Error> for ScoringError {
    fn from(err: serde_json::Error) -> Self {
        ScoringError::malformed(format!("JSON error: {}", err))
    }
}

/// Convert reqwest errors to ScoringError
impl From<reqwest::Error> for ScoringError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScoringError::unavailable(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            ScoringError::malformed(format!("Response decode error: {}", err))
        } else if err.is_connect() {
            ScoringError::unavailable(format!("Connection error: {}", err))
        } else if let Some(status) = err.status() {
            ScoringError::unavailable(format!("Engine returned HTTP {}: {}", status.as_u16(), err))
        } else {
            ScoringError::unavailable(format!("HTTP client error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_count_as_breaker_failures() {
        assert!(ScoringError::unavailable("exit status 1").is_breaker_failure());
        assert!(ScoringError::EngineTimeout(Duration::from_secs(5)).is_breaker_failure());
        assert!(ScoringError::malformed("not json").is_breaker_failure());
        assert!(ScoringError::declined("Failed to load model").is_breaker_failure());
    }

    #[test]
    fn test_short_circuit_is_not_a_failure() {
        let err = ScoringError::CircuitOpen {
            state: CircuitState::Open,
            retry_after: Some(Duration::from_secs(12)),
        };
        assert!(!err.is_breaker_failure());
        assert!(err.is_circuit_open());
        assert_eq!(err.kind(), "circuit_open");
        assert!(err.to_string().contains("12000ms"));

        assert!(!ScoringError::validation("bad amount").is_breaker_failure());
        assert!(!ScoringError::configuration("missing url").is_breaker_failure());
    }

    #[test]
    fn test_half_open_rejection_message() {
        let err = ScoringError::CircuitOpen {
            state: CircuitState::HalfOpen,
            retry_after: None,
        };
        assert_eq!(err.to_string(), "Circuit breaker HALF-OPEN: trial call limit reached");
    }

    #[test]
    fn test_pipeline_error_wraps_cause() {
        use std::error::Error as _;

        let err = PipelineError::new("TX1", ScoringError::unavailable("spawn failed"));
        assert_eq!(
            err.to_string(),
            "Scoring failed for transaction TX1: Scoring engine unavailable: spawn failed"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_is_malformed_response() {
        let err: ScoringError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "engine_malformed_response");
    }
}

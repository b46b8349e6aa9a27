//! # Fraud Scoring
//!
//! Fraud risk assessment for peer-to-peer payments.
//!
//! A transaction goes through:
//!
//! - `FeatureDeriver`: fills risk features the caller left out
//! - `ScoringClient`: sends the feature map to an external scoring engine
//!   and validates the reply, within a timeout
//! - `CircuitBreaker`: shared guard that stops calling the engine once it
//!   keeps failing, then probes for recovery
//! - `ScoringPipeline`: ties the above together and settles the transaction
//!   status from the engine's verdict
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fraud_scoring::{
//!     CircuitBreaker, CircuitBreakerConfig, FeatureDeriver, ProcessEngine, ScoringClient,
//!     ScoringPipeline, Transaction,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ProcessEngine::new("python3", ["ml_model/predict.py"]);
//! let client = ScoringClient::new(Arc::new(engine), Duration::from_secs(5));
//! let breaker = Arc::new(CircuitBreaker::new("ml-model", CircuitBreakerConfig::default()));
//! let pipeline = ScoringPipeline::new(FeatureDeriver::default(), client, breaker);
//!
//! let tx = Transaction::new("US-alice", "US-bob", 50.0, 14, 3600.0, 2.0, 1.2);
//! let result = pipeline.evaluate(&tx, "xgboost", "v1").await?;
//! println!("{}", result.message());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub use config::{ConfigProvider, ScoringServiceConfig, ServiceConfig};

pub mod engine;
pub use engine::{HttpEngine, InProcessEngine, ProcessEngine, ScoringClient, ScoringEngine};

pub mod enrichment;
pub use enrichment::{AccountAgeEstimator, FeatureDeriver};

pub mod error;
pub use error::{PipelineError, Result, ScoringError};

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

pub mod pipeline;
pub use pipeline::ScoringPipeline;

pub mod resilience;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub mod service;
pub use service::{serve_lines, StreamSummary};

pub mod types;
pub use types::{
    ScoringRequest, ScoringResponse, ScoringResult, Transaction, TransactionStatus,
};

mod util;

#[cfg(test)]
mod tests;

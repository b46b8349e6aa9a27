//! Scoring engine abstraction and client
//!
//! `ScoringEngine` is the transport seam: one request in, one raw response
//! out. `ScoringClient` sits on top of any engine and owns the parts of the
//! contract that do not depend on the transport, namely the timeout bound
//! and response validation.

mod http;
mod in_process;
mod process;

pub use http::HttpEngine;
pub use in_process::InProcessEngine;
pub use process::ProcessEngine;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use tracing::debug;

use crate::error::{Result, ScoringError};
use crate::types::{FeatureMap, RawScoringResponse, ScoringRequest, ScoringResponse};
use crate::util::measure_time_async;

/// Default bound on a single engine call
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single request/response exchange with an external scoring engine.
///
/// Implementations report transport problems as `EngineUnavailable` and
/// unparseable replies as `EngineMalformedResponse`. They return the reply
/// as written; `ScoringClient` decides whether it is a usable verdict.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringEngine: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<RawScoringResponse>;
}

/// Bounded, validating client for a scoring engine
#[derive(Clone)]
pub struct ScoringClient {
    engine: Arc<dyn ScoringEngine>,
    timeout: Duration,
}

impl std::fmt::Debug for ScoringClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScoringClient {
    pub fn new(engine: Arc<dyn ScoringEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Score one feature map.
    ///
    /// Fails with `EngineTimeout` once the bound is exceeded, whatever the
    /// transport; the in-flight engine call is dropped.
    pub async fn score(
        &self,
        features: FeatureMap,
        model_type: &str,
        model_version: &str,
    ) -> Result<ScoringResponse> {
        let request = ScoringRequest::new(features, model_type, model_version);

        let (outcome, elapsed) = measure_time_async(|| {
            tokio::time::timeout(self.timeout, self.engine.score(&request))
        })
        .await;
        histogram!("fraud_scoring.engine.latency_ms", elapsed.as_secs_f64() * 1000.0);

        let raw = match outcome {
            Ok(reply) => reply?,
            Err(_) => return Err(ScoringError::EngineTimeout(self.timeout)),
        };

        let response = raw.into_response(&request)?;
        debug!(
            fraud_score = response.fraud_score,
            is_fraud = response.is_fraud,
            elapsed_ms = %elapsed.as_millis(),
            "Scoring engine answered"
        );

        Ok(response)
    }
}

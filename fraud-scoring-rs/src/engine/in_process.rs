//! Engine backed by a Rust closure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::ScoringEngine;
use crate::error::{Result, ScoringError};
use crate::types::{RawScoringResponse, ScoringRequest};

type Scorer = Box<dyn Fn(&ScoringRequest) -> Result<RawScoringResponse> + Send + Sync>;

/// Scores requests in-process and counts how often it was asked to.
pub struct InProcessEngine {
    scorer: Scorer,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl std::fmt::Debug for InProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessEngine")
            .field("delay", &self.delay)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl InProcessEngine {
    pub fn new<F>(scorer: F) -> Self
    where
        F: Fn(&ScoringRequest) -> Result<RawScoringResponse> + Send + Sync + 'static,
    {
        Self {
            scorer: Box::new(scorer),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return the same verdict, echoing the requested model
    pub fn constant(fraud_score: i64, is_fraud: bool) -> Self {
        Self::new(move |request| {
            Ok(RawScoringResponse {
                fraud_score: Some(fraud_score),
                is_fraud: Some(is_fraud),
                model_type: Some(request.model_type.clone()),
                model_version: Some(request.model_version.clone()),
                ..Default::default()
            })
        })
    }

    /// Always fail with `error`
    pub fn failing(error: ScoringError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringEngine for InProcessEngine {
    async fn score(&self, request: &ScoringRequest) -> Result<RawScoringResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.scorer)(request)
    }
}

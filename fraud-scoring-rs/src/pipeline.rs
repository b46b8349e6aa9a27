//! Transaction scoring pipeline
//!
//! enrich -> feature map -> breaker-guarded engine call -> reconcile status

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::enrichment::{feature_map, FeatureDeriver};
use crate::engine::ScoringClient;
use crate::error::{PipelineError, ScoringError};
use crate::resilience::CircuitBreaker;
use crate::types::{ScoringResponse, ScoringResult, Transaction, TransactionStatus};

/// Entry point for scoring one transaction at a time.
///
/// Cheap to share between tasks; the only shared mutable state is the
/// circuit breaker, which may also be shared with other pipelines that talk
/// to the same engine.
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    deriver: FeatureDeriver,
    client: ScoringClient,
    breaker: Arc<CircuitBreaker>,
}

impl ScoringPipeline {
    pub fn new(deriver: FeatureDeriver, client: ScoringClient, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            deriver,
            client,
            breaker,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Score `transaction` with the given model.
    ///
    /// The input is never modified. On success the result carries an enriched,
    /// scored copy; on failure nothing is retried and the caller's
    /// transaction is still pending.
    pub async fn evaluate(
        &self,
        transaction: &Transaction,
        model_type: &str,
        model_version: &str,
    ) -> Result<ScoringResult, PipelineError> {
        if transaction.is_scored() {
            return Err(self.fail(
                transaction,
                ScoringError::validation(format!(
                    "transaction is already {}",
                    transaction.status
                )),
            ));
        }

        let mut enriched = self.deriver.enrich(transaction);
        let features = feature_map(&enriched);

        let response = self
            .breaker
            .call(|| self.client.score(features, model_type, model_version))
            .await
            .map_err(|cause| self.fail(transaction, cause))?;

        apply_verdict(&mut enriched, &response);
        counter!("fraud_scoring.evaluations", 1, "outcome" => enriched.status.to_string());

        match enriched.status {
            TransactionStatus::Flagged => warn!(
                transaction_id = %enriched.id,
                fraud_score = response.fraud_score,
                status = %enriched.status,
                model_type = %response.model_type,
                "Transaction flagged for review"
            ),
            _ => info!(
                transaction_id = %enriched.id,
                fraud_score = response.fraud_score,
                status = %enriched.status,
                model_type = %response.model_type,
                "Transaction scored"
            ),
        }

        Ok(ScoringResult {
            transaction: enriched,
            response,
        })
    }

    fn fail(&self, transaction: &Transaction, cause: ScoringError) -> PipelineError {
        counter!("fraud_scoring.evaluations", 1, "outcome" => "failed");
        warn!(
            transaction_id = %transaction.id,
            error_kind = cause.kind(),
            circuit_state = %self.breaker.state(),
            error = %cause,
            "Transaction scoring failed"
        );
        PipelineError::new(transaction.id.clone(), cause)
    }
}

/// Copy the engine's verdict onto the transaction and settle its status
fn apply_verdict(transaction: &mut Transaction, response: &ScoringResponse) {
    transaction.fraud_score = Some(response.fraud_score);
    transaction.model_type = Some(response.model_type.clone());
    transaction.model_version = Some(response.model_version.clone());
    transaction.status = if response.is_fraud {
        TransactionStatus::Flagged
    } else {
        TransactionStatus::Completed
    };
}

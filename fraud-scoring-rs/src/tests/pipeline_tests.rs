//! End-to-end tests for the scoring pipeline
//!
//! An in-process engine stands in for the model and a manual clock drives
//! the circuit breaker, so every scenario is deterministic.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use crate::engine::{InProcessEngine, ScoringClient};
    use crate::enrichment::{FeatureDeriver, MAX_ESTIMATED_ACCOUNT_AGE_DAYS};
    use crate::error::ScoringError;
    use crate::pipeline::ScoringPipeline;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, ManualClock};
    use crate::types::{ForeignFlag, RawScoringResponse, ScoringRequest, Transaction, TransactionStatus};

    fn transaction() -> Transaction {
        Transaction::new("US-alice", "US-bob", 50.0, 14, 3600.0, 2.0, 1.2)
    }

    fn breaker(clock: &Arc<ManualClock>) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::with_clock(
            "ml-model",
            CircuitBreakerConfig::default(),
            clock.clone(),
        ))
    }

    fn pipeline(engine: &Arc<InProcessEngine>, breaker: &Arc<CircuitBreaker>) -> ScoringPipeline {
        let client = ScoringClient::new(engine.clone(), Duration::from_secs(5));
        ScoringPipeline::new(FeatureDeriver::default(), client, Arc::clone(breaker))
    }

    fn unreachable_engine() -> Arc<InProcessEngine> {
        Arc::new(InProcessEngine::failing(ScoringError::unavailable(
            "connection refused",
        )))
    }

    #[tokio::test]
    async fn test_low_score_completes() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(InProcessEngine::constant(10, false));
        let pipeline = pipeline(&engine, &breaker(&clock));

        let result = assert_ok!(pipeline.evaluate(&transaction(), "xgboost", "v1").await);

        assert_eq!(result.transaction.status, TransactionStatus::Completed);
        assert_eq!(result.transaction.fraud_score, Some(10));
        assert_eq!(result.response.fraud_score, 10);
        assert_eq!(result.message(), "Transaction was processed successfully.");
    }

    #[tokio::test]
    async fn test_fraud_verdict_flags() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(InProcessEngine::constant(92, true));
        let pipeline = pipeline(&engine, &breaker(&clock));

        let result = pipeline.evaluate(&transaction(), "xgboost", "v1").await.unwrap();

        assert_eq!(result.transaction.status, TransactionStatus::Flagged);
        assert_eq!(result.transaction.fraud_score, Some(92));
        assert_eq!(result.transaction.model_type.as_deref(), Some("xgboost"));
        assert_eq!(result.transaction.model_version.as_deref(), Some("v1"));
        assert_eq!(
            result.message(),
            "Transaction was flagged for review due to suspicious activity."
        );
    }

    #[tokio::test]
    async fn test_echoed_model_overrides_requested() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(InProcessEngine::new(|_| {
            Ok(RawScoringResponse {
                fraud_score: Some(30),
                is_fraud: Some(false),
                model_type: Some("lightgbm".to_string()),
                model_version: Some("v7".to_string()),
                ..Default::default()
            })
        }));
        let pipeline = pipeline(&engine, &breaker(&clock));

        let result = pipeline.evaluate(&transaction(), "xgboost", "v1").await.unwrap();

        assert_eq!(result.transaction.model_type.as_deref(), Some("lightgbm"));
        assert_eq!(result.transaction.model_version.as_deref(), Some("v7"));
    }

    #[tokio::test]
    async fn test_unreachable_engine_opens_circuit() {
        let clock = Arc::new(ManualClock::new());
        let engine = unreachable_engine();
        let pipeline = pipeline(&engine, &breaker(&clock));
        let tx = transaction();

        for _ in 0..3 {
            let err = pipeline.evaluate(&tx, "xgboost", "v1").await.unwrap_err();
            assert!(matches!(err.cause, ScoringError::EngineUnavailable(_)));
        }
        assert_eq!(engine.calls(), 3);

        let err = pipeline.evaluate(&tx, "xgboost", "v1").await.unwrap_err();
        assert!(matches!(
            err.cause,
            ScoringError::CircuitOpen { state: CircuitState::Open, .. }
        ));
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn test_trial_call_moves_to_half_open() {
        let clock = Arc::new(ManualClock::new());
        let shared = breaker(&clock);
        let broken = pipeline(&unreachable_engine(), &shared);
        let healthy_engine = Arc::new(InProcessEngine::constant(10, false));
        let healthy = pipeline(&healthy_engine, &shared);
        let tx = transaction();

        for _ in 0..3 {
            let _ = broken.evaluate(&tx, "xgboost", "v1").await;
        }
        assert_eq!(shared.state(), CircuitState::Open);

        // Still open just before the timeout
        clock.advance(Duration::from_secs(29));
        assert!(healthy.evaluate(&tx, "xgboost", "v1").await.is_err());
        assert_eq!(healthy_engine.calls(), 0);

        clock.advance(Duration::from_secs(1));
        healthy.evaluate(&tx, "xgboost", "v1").await.unwrap();

        let health = shared.health();
        assert_eq!(health.state, CircuitState::HalfOpen);
        assert_eq!(health.requests, 1);
        assert_eq!(health.consecutive_successes, 1);
    }

    #[tokio::test]
    async fn test_trial_successes_close_circuit() {
        let clock = Arc::new(ManualClock::new());
        let shared = breaker(&clock);
        let broken = pipeline(&unreachable_engine(), &shared);
        let healthy = pipeline(&Arc::new(InProcessEngine::constant(10, false)), &shared);
        let tx = transaction();

        for _ in 0..3 {
            let _ = broken.evaluate(&tx, "xgboost", "v1").await;
        }
        clock.advance(Duration::from_secs(30));

        for _ in 0..5 {
            healthy.evaluate(&tx, "xgboost", "v1").await.unwrap();
        }

        let health = shared.health();
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.failures, 0);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens_circuit() {
        let clock = Arc::new(ManualClock::new());
        let shared = breaker(&clock);
        let broken_engine = unreachable_engine();
        let broken = pipeline(&broken_engine, &shared);
        let healthy = pipeline(&Arc::new(InProcessEngine::constant(10, false)), &shared);
        let tx = transaction();

        for _ in 0..3 {
            let _ = broken.evaluate(&tx, "xgboost", "v1").await;
        }
        clock.advance(Duration::from_secs(30));

        healthy.evaluate(&tx, "xgboost", "v1").await.unwrap();
        healthy.evaluate(&tx, "xgboost", "v1").await.unwrap();
        let err = broken.evaluate(&tx, "xgboost", "v1").await.unwrap_err();
        assert!(err.cause.is_breaker_failure());
        assert_eq!(shared.state(), CircuitState::Open);

        let err = healthy.evaluate(&tx, "xgboost", "v1").await.unwrap_err();
        assert!(err.cause.is_circuit_open());
        assert_eq!(broken_engine.calls(), 4);
    }

    #[tokio::test]
    async fn test_timeouts_count_as_failures() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(
            InProcessEngine::constant(10, false).with_delay(Duration::from_secs(10)),
        );
        let client = ScoringClient::new(engine.clone(), Duration::from_millis(10));
        let shared = breaker(&clock);
        let pipeline = ScoringPipeline::new(FeatureDeriver::default(), client, shared.clone());

        for _ in 0..3 {
            let err = pipeline.evaluate(&transaction(), "xgboost", "v1").await.unwrap_err();
            assert_eq!(err.cause, ScoringError::EngineTimeout(Duration::from_millis(10)));
        }

        assert_eq!(shared.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_abandoned_evaluations_leave_circuit_closed() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(
            InProcessEngine::constant(10, false).with_delay(Duration::from_millis(200)),
        );
        let shared = breaker(&clock);
        let pipeline = pipeline(&engine, &shared);
        let tx = transaction();

        for _ in 0..3 {
            let evaluation = pipeline.evaluate(&tx, "xgboost", "v1");
            assert_err!(tokio::time::timeout(Duration::from_millis(10), evaluation).await);
        }

        assert_eq!(shared.state(), CircuitState::Closed);
        assert_eq!(shared.health().failures, 0);

        let result = assert_ok!(pipeline.evaluate(&tx, "xgboost", "v1").await);
        assert_eq!(result.transaction.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_failure_leaves_transaction_pending() {
        let clock = Arc::new(ManualClock::new());
        let pipeline = pipeline(&unreachable_engine(), &breaker(&clock));
        let tx = transaction().with_id("TX-42");
        let before = tx.clone();

        let err = assert_err!(pipeline.evaluate(&tx, "xgboost", "v1").await);

        assert_eq!(tx, before);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.fraud_score, None);
        assert_eq!(err.transaction_id, "TX-42");
        assert!(err.to_string().contains("TX-42"));
    }

    #[tokio::test]
    async fn test_scored_transaction_is_rejected() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(InProcessEngine::constant(10, false));
        let shared = breaker(&clock);
        let pipeline = pipeline(&engine, &shared);

        let result = pipeline.evaluate(&transaction(), "xgboost", "v1").await.unwrap();
        let err = pipeline
            .evaluate(&result.transaction, "xgboost", "v1")
            .await
            .unwrap_err();

        assert!(matches!(err.cause, ScoringError::Validation(_)));
        assert_eq!(engine.calls(), 1);
        assert_eq!(shared.health().requests, 1);
    }

    #[tokio::test]
    async fn test_enrichment_keeps_supplied_values() {
        let clock = Arc::new(ManualClock::new());
        let seen: Arc<Mutex<Vec<ScoringRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let engine = Arc::new(InProcessEngine::new(move |request| {
            seen_clone.lock().unwrap().push(request.clone());
            Ok(RawScoringResponse {
                fraud_score: Some(5),
                is_fraud: Some(false),
                ..Default::default()
            })
        }));
        let pipeline = pipeline(&engine, &breaker(&clock));

        let mut supplied = transaction();
        supplied.recipient_account_age_days = Some(40.0);
        let result = pipeline.evaluate(&supplied, "xgboost", "v1").await.unwrap();
        assert_eq!(result.transaction.recipient_account_age_days, Some(40.0));

        let omitted = transaction();
        let result = pipeline.evaluate(&omitted, "xgboost", "v1").await.unwrap();
        let estimate = result.transaction.recipient_account_age_days.unwrap();
        assert!((0.0..MAX_ESTIMATED_ACCOUNT_AGE_DAYS).contains(&estimate));
        assert_eq!(result.transaction.is_foreign_transaction, ForeignFlag::Domestic);

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].transaction.get("recipient_account_age_days"), Some(&40.0));
        assert_eq!(requests[0].transaction.get("is_foreign_transaction"), Some(&0.0));
        assert_eq!(requests[0].transaction.get("amount"), Some(&50.0));
        assert_eq!(requests[0].model_type, "xgboost");
    }

    #[tokio::test]
    async fn test_round_trip_preserves_parties_and_amount() {
        let clock = Arc::new(ManualClock::new());
        let pipeline = pipeline(&Arc::new(InProcessEngine::constant(64, false)), &breaker(&clock));

        let original = Transaction::new("DE-sender-01", "FR-recipient-9", 1234.56, 2, 12.0, 0.0, 880.0);
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded = Transaction::from_payload(&encoded).unwrap();

        let result = pipeline.evaluate(&decoded, "xgboost", "v1").await.unwrap();
        let document = result.to_document();
        let returned: Transaction = serde_json::from_value(document["transaction"].clone()).unwrap();

        assert_eq!(returned.id, original.id);
        assert_eq!(returned.sender_id, original.sender_id);
        assert_eq!(returned.recipient_id, original.recipient_id);
        assert_eq!(returned.amount, original.amount);
        assert_eq!(returned.is_foreign_transaction, ForeignFlag::Foreign);
        assert_eq!(document["fraud_score"], 64);
        assert_eq!(document["transaction"]["status"], "completed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_trials_respect_limit() {
        let clock = Arc::new(ManualClock::new());
        let shared = breaker(&clock);
        let broken = pipeline(&unreachable_engine(), &shared);
        for _ in 0..3 {
            let _ = broken.evaluate(&transaction(), "xgboost", "v1").await;
        }
        clock.advance(Duration::from_secs(30));

        let engine = Arc::new(
            InProcessEngine::constant(10, false).with_delay(Duration::from_millis(50)),
        );
        let healthy = pipeline(&engine, &shared);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let pipeline = healthy.clone();
                tokio::spawn(async move {
                    let tx = transaction();
                    let outcome = pipeline.evaluate(&tx, "xgboost", "v1").await;
                    outcome
                })
            })
            .collect();

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => {
                    assert_eq!(
                        err.cause,
                        ScoringError::CircuitOpen { state: CircuitState::HalfOpen, retry_after: None }
                    );
                    rejected += 1;
                }
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(rejected, 15);
        assert_eq!(engine.calls(), 5);
        assert_eq!(shared.state(), CircuitState::Closed);
    }
}

//! Circuit Breaker Demo
//!
//! Runs a scoring pipeline against an in-process engine that goes down for
//! a while and then recovers, printing how the breaker reacts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fraud_scoring::{
    init_logging, CircuitBreaker, CircuitBreakerConfig, FeatureDeriver, InProcessEngine,
    LoggingConfig, ScoringClient, ScoringError, ScoringPipeline, Transaction,
};
use fraud_scoring::types::RawScoringResponse;

#[tokio::main]
async fn main() -> fraud_scoring::Result<()> {
    init_logging(Some(LoggingConfig::default()))?;

    println!("Circuit Breaker Demo");
    println!("====================\n");

    // The engine is healthy until `down` is set
    let down = Arc::new(AtomicBool::new(false));
    let down_clone = Arc::clone(&down);
    let engine = Arc::new(InProcessEngine::new(move |request| {
        if down_clone.load(Ordering::SeqCst) {
            return Err(ScoringError::unavailable("model process crashed"));
        }
        let score = (request.transaction.get("amount").copied().unwrap_or(0.0) / 20.0).min(100.0);
        Ok(RawScoringResponse {
            fraud_score: Some(score as i64),
            is_fraud: Some(score > 80.0),
            ..Default::default()
        })
    }));

    let config = CircuitBreakerConfig {
        open_timeout: Duration::from_secs(2),
        half_open_max_calls: 2,
        ..CircuitBreakerConfig::default()
    };
    let mut breaker = CircuitBreaker::new("ml-model", config);
    breaker.set_state_change_callback(|name, from, to, health| {
        println!(
            "  [{}] {} -> {} after {} requests ({} failed)",
            name, from, to, health.requests, health.failures
        );
    });
    let breaker = Arc::new(breaker);

    let client = ScoringClient::new(engine.clone(), Duration::from_secs(1));
    let pipeline = ScoringPipeline::new(FeatureDeriver::default(), client, breaker.clone());

    let payments = [
        Transaction::new("US-alice", "US-bob", 40.0, 14, 3600.0, 4.0, 2.5),
        Transaction::new("US-carol", "NG-dave", 1900.0, 3, 30.0, 0.0, 9500.0),
    ];

    println!("Engine healthy:");
    for tx in &payments {
        report(&pipeline, tx).await;
    }

    println!("\nEngine down:");
    down.store(true, Ordering::SeqCst);
    for tx in payments.iter().cycle().take(5) {
        report(&pipeline, tx).await;
    }
    println!("  engine calls so far: {}", engine.calls());

    println!("\nEngine back, waiting out the open timeout...");
    down.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(2100)).await;
    for tx in payments.iter().cycle().take(3) {
        report(&pipeline, tx).await;
    }

    let health = breaker.health();
    println!(
        "\nFinal state: {} ({} calls rejected while open)",
        health.state, health.rejected
    );

    Ok(())
}

async fn report(pipeline: &ScoringPipeline, tx: &Transaction) {
    match pipeline.evaluate(tx, "xgboost", "v1").await {
        Ok(result) => println!(
            "  {} -> {} (score {})",
            tx.recipient_id, result.transaction.status, result.response.fraud_score
        ),
        Err(e) => println!("  {} -> error: {}", tx.recipient_id, e.cause),
    }
}

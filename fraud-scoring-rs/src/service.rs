//! Newline-delimited scoring loop
//!
//! Each input line holds one transaction, bare or wrapped as
//! `{"transaction": {...}}`, and produces one output line: the response
//! document or `{"error": "..."}`. Every line goes through the same pipeline,
//! so its circuit breaker sees the whole stream.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::pipeline::ScoringPipeline;
use crate::types::Transaction;

/// Totals for one run of [`serve_lines`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub scored: usize,
    pub failed: usize,
}

/// Score every non-blank line of `input`, writing one JSON document per line
/// to `output`, until `input` ends.
///
/// Scoring failures are reported inline and do not stop the loop; only I/O
/// errors on either stream do.
pub async fn serve_lines<R, W>(
    pipeline: &ScoringPipeline,
    input: R,
    mut output: W,
    model_type: &str,
    model_version: &str,
) -> std::io::Result<StreamSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut summary = StreamSummary::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let document = match score_line(pipeline, &line, model_type, model_version).await {
            Ok(document) => {
                summary.scored += 1;
                document
            }
            Err(document) => {
                summary.failed += 1;
                document
            }
        };

        let mut encoded = document.to_string();
        encoded.push('\n');
        output.write_all(encoded.as_bytes()).await?;
        output.flush().await?;
    }

    info!(
        scored = summary.scored,
        failed = summary.failed,
        circuit_state = %pipeline.breaker().state(),
        "Input stream finished"
    );
    Ok(summary)
}

async fn score_line(
    pipeline: &ScoringPipeline,
    line: &str,
    model_type: &str,
    model_version: &str,
) -> Result<Value, Value> {
    let transaction = Transaction::from_payload(line)
        .and_then(|transaction| transaction.validate().map(|_| transaction))
        .map_err(|err| {
            debug!(error = %err, "Rejected input line");
            error_document(&err)
        })?;

    pipeline
        .evaluate(&transaction, model_type, model_version)
        .await
        .map(|result| result.to_document())
        .map_err(|err| error_document(&err))
}

/// `{"error": "<message>"}`
pub fn error_document(err: &dyn std::fmt::Display) -> Value {
    json!({ "error": err.to_string() })
}

//! fraud-scoring: score payment transactions
//!
//! Without `--input`, reads newline-delimited transactions from stdin until
//! it closes and prints one response document per line. Every line shares
//! one pipeline and its circuit breaker. With `--input`, scores the single
//! transaction in that file and exits non-zero if it could not be scored.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tokio::io::BufReader;

use fraud_scoring::service::{error_document, serve_lines};
use fraud_scoring::{init_logging, ScoringServiceConfig, Transaction};

#[derive(Parser, Debug)]
#[command(name = "fraud-scoring")]
#[command(about = "Score peer-to-peer payments for fraud risk", long_about = None)]
struct Cli {
    /// Score the single transaction in this file instead of streaming stdin
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Model family to score with (default: FRAUD_DEFAULT_MODEL_TYPE or xgboost)
    #[arg(long)]
    model_type: Option<String>,

    /// Model version to score with (default: FRAUD_DEFAULT_MODEL_VERSION or v1)
    #[arg(long)]
    model_version: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::error!(error = %message, "Scoring request failed");
            println!("{}", error_document(&message));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ScoringServiceConfig::from_env().context("Failed to load configuration")?;
    init_logging(Some(config.logging.clone()))?;

    let model_type = cli
        .model_type
        .unwrap_or_else(|| config.default_model_type.clone());
    let model_version = cli
        .model_version
        .unwrap_or_else(|| config.default_model_version.clone());

    let pipeline = config.build_pipeline()?;

    match &cli.input {
        Some(path) => {
            let payload = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let transaction = Transaction::from_payload(&payload)?;
            transaction.validate()?;

            let result = pipeline
                .evaluate(&transaction, &model_type, &model_version)
                .await?;
            println!("{}", result.to_document());
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            serve_lines(&pipeline, stdin, tokio::io::stdout(), &model_type, &model_version)
                .await
                .context("Failed to stream transactions")?;
        }
    }

    Ok(())
}

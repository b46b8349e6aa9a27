//! Engine run as a local child process
//!
//! The request document is written to the child's stdin, which is then
//! closed; the child answers with one JSON document on stdout.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::ScoringEngine;
use crate::error::{Result, ScoringError};
use crate::types::{RawScoringResponse, ScoringRequest};
use crate::util::truncate_string;

/// Longest stderr excerpt carried in an error message
const MAX_DIAGNOSTIC_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessEngine {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ScoringEngine for ProcessEngine {
    async fn score(&self, request: &ScoringRequest) -> Result<RawScoringResponse> {
        let payload = serde_json::to_vec(request)?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            ScoringError::unavailable(format!("failed to start `{}`: {}", self.command_line(), e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                // The engine may exit before reading its input; its exit status tells the rest
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    return Err(ScoringError::unavailable(format!(
                        "failed to write request to `{}`: {}",
                        self.command_line(),
                        e
                    )));
                }
                _ => {}
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            ScoringError::unavailable(format!("failed to wait for `{}`: {}", self.command_line(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(ScoringError::unavailable(format!(
                "`{}` exited with {}: {}",
                self.command_line(),
                output.status,
                truncate_string(detail.trim(), MAX_DIAGNOSTIC_LEN)
            )));
        }

        debug!(
            command = %self.command_line(),
            stdout_bytes = output.stdout.len(),
            "Scoring process finished"
        );

        serde_json::from_slice(&output.stdout).map_err(|e| {
            let stdout = String::from_utf8_lossy(&output.stdout);
            ScoringError::malformed(format!(
                "engine output is not a scoring response ({}): {}",
                e,
                truncate_string(stdout.trim(), MAX_DIAGNOSTIC_LEN)
            ))
        })
    }
}

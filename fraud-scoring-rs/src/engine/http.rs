//! Engine reached over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::ScoringEngine;
use crate::error::{Result, ScoringError};
use crate::types::{RawScoringResponse, ScoringRequest};
use crate::util::truncate_string;

const USER_AGENT: &str = concat!("fraud-scoring/", env!("CARGO_PKG_VERSION"));

/// Header carrying the requested model family
pub const MODEL_TYPE_HEADER: &str = "X-Model-Type";

/// Header carrying the requested model version
pub const MODEL_VERSION_HEADER: &str = "X-Model-Version";

const MAX_ERROR_BODY_LEN: usize = 512;

/// POSTs the request document to a scoring endpoint
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_send_error(&self, err: reqwest::Error) -> ScoringError {
        if err.is_timeout() {
            ScoringError::EngineTimeout(self.timeout)
        } else {
            ScoringError::from(err)
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ScoringError::configuration(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait]
impl ScoringEngine for HttpEngine {
    async fn score(&self, request: &ScoringRequest) -> Result<RawScoringResponse> {
        let response = self
            .client
            .post(&self.url)
            .header(MODEL_TYPE_HEADER, request.model_type.as_str())
            .header(MODEL_VERSION_HEADER, request.model_version.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        debug!(url = %self.url, status = status.as_u16(), body_bytes = body.len(), "Scoring endpoint answered");

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(ScoringError::unavailable(format!(
                "{} returned HTTP {}: {}",
                self.url,
                status.as_u16(),
                truncate_string(text.trim(), MAX_ERROR_BODY_LEN)
            )));
        }

        serde_json::from_slice(&body).map_err(|e| {
            ScoringError::malformed(format!("engine body is not a scoring response: {}", e))
        })
    }
}

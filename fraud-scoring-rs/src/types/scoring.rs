//! Wire contract with the external scoring engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::transaction::{Transaction, TransactionStatus};
use crate::error::{Result, ScoringError};

/// Feature name to numeric value, in stable key order
pub type FeatureMap = BTreeMap<String, f64>;

/// Highest score the engine may return
pub const MAX_FRAUD_SCORE: i64 = 100;

/// Request document sent to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub transaction: FeatureMap,
    pub model_type: String,
    pub model_version: String,
}

impl ScoringRequest {
    pub fn new(
        features: FeatureMap,
        model_type: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            transaction: features,
            model_type: model_type.into(),
            model_version: model_version.into(),
        }
    }
}

/// Response document exactly as the engine wrote it.
///
/// Every field is optional here so that an `{"error": ...}` reply can be told
/// apart from a reply that is simply broken.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawScoringResponse {
    /// Echo of the submitted features, ignored
    #[serde(default)]
    pub transaction: Option<Value>,

    #[serde(default)]
    pub fraud_score: Option<i64>,

    #[serde(default)]
    pub is_fraud: Option<bool>,

    #[serde(default)]
    pub model_type: Option<String>,

    #[serde(default)]
    pub model_version: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl RawScoringResponse {
    /// Turn the raw reply into a `ScoringResponse`.
    ///
    /// Echo fields missing from the reply fall back to what was requested.
    pub fn into_response(self, request: &ScoringRequest) -> Result<ScoringResponse> {
        if let Some(error) = self.error {
            return Err(ScoringError::declined(error));
        }

        let fraud_score = self
            .fraud_score
            .ok_or_else(|| ScoringError::malformed("missing fraud_score"))?;
        if !(0..=MAX_FRAUD_SCORE).contains(&fraud_score) {
            return Err(ScoringError::malformed(format!(
                "fraud_score {} outside 0..={}",
                fraud_score, MAX_FRAUD_SCORE
            )));
        }

        let is_fraud = self
            .is_fraud
            .ok_or_else(|| ScoringError::malformed("missing is_fraud"))?;

        Ok(ScoringResponse {
            fraud_score: fraud_score as u8,
            is_fraud,
            model_type: self
                .model_type
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| request.model_type.clone()),
            model_version: self
                .model_version
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| request.model_version.clone()),
        })
    }
}

/// A validated engine verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResponse {
    /// Always within 0..=100
    pub fraud_score: u8,
    pub is_fraud: bool,
    pub model_type: String,
    pub model_version: String,
}

/// Outcome of a successful evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    /// Enriched and scored copy of the input transaction
    pub transaction: Transaction,

    /// Verdict as returned by the engine
    pub response: ScoringResponse,
}

impl ScoringResult {
    /// User-facing summary of the outcome
    pub fn message(&self) -> &'static str {
        match self.transaction.status {
            TransactionStatus::Flagged => {
                "Transaction was flagged for review due to suspicious activity."
            }
            _ => "Transaction was processed successfully.",
        }
    }

    /// Response document handed back to the transport layer
    pub fn to_document(&self) -> Value {
        json!({
            "transaction": self.transaction,
            "fraud_score": self.response.fraud_score,
            "is_fraud": self.response.is_fraud,
            "model_type": self.response.model_type,
            "model_version": self.response.model_version,
            "message": self.message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScoringRequest {
        ScoringRequest::new(FeatureMap::new(), "xgboost", "v1")
    }

    fn parse(body: &str) -> Result<ScoringResponse> {
        let raw: RawScoringResponse = serde_json::from_str(body)?;
        raw.into_response(&request())
    }

    #[test]
    fn test_request_wire_shape() {
        let mut features = FeatureMap::new();
        features.insert("amount".to_string(), 50.0);
        let value = serde_json::to_value(ScoringRequest::new(features, "autoencoder", "v2")).unwrap();

        assert_eq!(value["transaction"]["amount"], 50.0);
        assert_eq!(value["model_type"], "autoencoder");
        assert_eq!(value["model_version"], "v2");
    }

    #[test]
    fn test_echo_defaults_to_request() {
        let response = parse(r#"{"fraud_score": 10, "is_fraud": false}"#).unwrap();
        assert_eq!(response.fraud_score, 10);
        assert_eq!(response.model_type, "xgboost");
        assert_eq!(response.model_version, "v1");

        let response =
            parse(r#"{"fraud_score": 92, "is_fraud": true, "model_type": "isolation_forest"}"#)
                .unwrap();
        assert_eq!(response.model_type, "isolation_forest");
        assert!(response.is_fraud);
    }

    #[test]
    fn test_error_field_is_never_success() {
        let err = parse(r#"{"error": "Failed to load model"}"#).unwrap_err();
        assert_eq!(err, ScoringError::declined("Failed to load model"));

        let err = parse(r#"{"fraud_score": 5, "is_fraud": false, "error": "partial"}"#).unwrap_err();
        assert!(matches!(err, ScoringError::EngineDeclined(_)));
    }

    #[test]
    fn test_out_of_range_or_missing_fields_are_malformed() {
        assert!(matches!(
            parse(r#"{"fraud_score": 101, "is_fraud": true}"#),
            Err(ScoringError::EngineMalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"fraud_score": -3, "is_fraud": false}"#),
            Err(ScoringError::EngineMalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"is_fraud": false}"#),
            Err(ScoringError::EngineMalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"fraud_score": 3}"#),
            Err(ScoringError::EngineMalformedResponse(_))
        ));
        assert!(matches!(parse("not json"), Err(ScoringError::EngineMalformedResponse(_))));
    }
}

//! Peer-to-peer payment transaction

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Result, ScoringError};

/// Lifecycle status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Not yet scored
    #[default]
    Pending,
    /// Scored and accepted
    Completed,
    /// Scored and held for review
    Flagged,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Flagged => write!(f, "flagged"),
        }
    }
}

/// Whether sender and recipient sit in different jurisdictions.
///
/// On the wire this is `-1`/absent/`null` for unknown, `0`/`false` and
/// `1`/`true` otherwise. Known values are written back as `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignFlag {
    #[default]
    Unknown,
    Domestic,
    Foreign,
}

impl ForeignFlag {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ForeignFlag::Unknown)
    }

    /// Numeric feature value, if known
    pub fn as_feature(&self) -> Option<f64> {
        match self {
            ForeignFlag::Unknown => None,
            ForeignFlag::Domestic => Some(0.0),
            ForeignFlag::Foreign => Some(1.0),
        }
    }
}

impl From<bool> for ForeignFlag {
    fn from(foreign: bool) -> Self {
        if foreign {
            ForeignFlag::Foreign
        } else {
            ForeignFlag::Domestic
        }
    }
}

impl Serialize for ForeignFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ForeignFlag::Unknown => serializer.serialize_i8(-1),
            ForeignFlag::Domestic => serializer.serialize_u8(0),
            ForeignFlag::Foreign => serializer.serialize_u8(1),
        }
    }
}

impl<'de> Deserialize<'de> for ForeignFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawFlag {
            Bool(bool),
            Int(i64),
        }

        match Option::<RawFlag>::deserialize(deserializer)? {
            None => Ok(ForeignFlag::Unknown),
            Some(RawFlag::Bool(foreign)) => Ok(foreign.into()),
            Some(RawFlag::Int(value)) if value < 0 => Ok(ForeignFlag::Unknown),
            Some(RawFlag::Int(0)) => Ok(ForeignFlag::Domestic),
            Some(RawFlag::Int(1)) => Ok(ForeignFlag::Foreign),
            Some(RawFlag::Int(other)) => Err(serde::de::Error::custom(format!(
                "is_foreign_transaction must be -1, 0 or 1, got {}",
                other
            ))),
        }
    }
}

fn generate_transaction_id() -> String {
    format!("TX{}", Uuid::new_v4().simple())
}

/// A single payment event as received from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied or generated identifier
    #[serde(default = "generate_transaction_id")]
    pub id: String,

    pub sender_id: String,

    pub recipient_id: String,

    /// Payment amount, non-negative
    pub amount: f64,

    /// Hour of day the payment was issued (0-23)
    pub hour_of_day: u8,

    /// Seconds since the sender's previous transaction
    pub time_since_last_tx: f64,

    /// How often the sender has paid this recipient
    pub recipient_frequency: f64,

    /// Distance between sender and recipient in kilometres
    pub distance_to_recipient_km: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_account_age_days: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_account_age_days: Option<f64>,

    #[serde(default, skip_serializing_if = "ForeignFlag::is_unknown")]
    pub is_foreign_transaction: ForeignFlag,

    /// Issue timestamp
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,

    #[serde(default)]
    pub status: TransactionStatus,

    /// Set once scoring completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_score: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Transaction {
    /// Create a pending transaction with the mandatory features
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        amount: f64,
        hour_of_day: u8,
        time_since_last_tx: f64,
        recipient_frequency: f64,
        distance_to_recipient_km: f64,
    ) -> Self {
        Self {
            id: generate_transaction_id(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            amount,
            hour_of_day,
            time_since_last_tx,
            recipient_frequency,
            distance_to_recipient_km,
            user_account_age_days: None,
            recipient_account_age_days: None,
            is_foreign_transaction: ForeignFlag::Unknown,
            date: Utc::now(),
            status: TransactionStatus::Pending,
            fraud_score: None,
            model_type: None,
            model_version: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Check the inbound invariants the transport layer is expected to enforce
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ScoringError::validation("id must not be empty"));
        }
        if self.sender_id.trim().is_empty() {
            return Err(ScoringError::validation("sender_id must not be empty"));
        }
        if self.recipient_id.trim().is_empty() {
            return Err(ScoringError::validation("recipient_id must not be empty"));
        }
        if self.hour_of_day > 23 {
            return Err(ScoringError::validation(format!(
                "hour_of_day must be between 0 and 23, got {}",
                self.hour_of_day
            )));
        }

        let non_negative = [
            ("amount", self.amount),
            ("time_since_last_tx", self.time_since_last_tx),
            ("recipient_frequency", self.recipient_frequency),
            ("distance_to_recipient_km", self.distance_to_recipient_km),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::validation(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Whether the pipeline has already produced a verdict
    pub fn is_scored(&self) -> bool {
        self.status != TransactionStatus::Pending
    }

    /// Decode an inbound payload, either a bare transaction or one wrapped
    /// as `{"transaction": {...}}`
    pub fn from_payload(payload: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| ScoringError::validation(format!("payload is not valid JSON: {}", e)))?;

        if let Some(inner) = value.get_mut("transaction").filter(|inner| inner.is_object()) {
            value = inner.take();
        }

        serde_json::from_value(value)
            .map_err(|e| ScoringError::validation(format!("invalid transaction: {}", e)))
    }
}

//! Data model for transactions and the scoring engine wire contract

pub mod scoring;
pub mod transaction;

pub use scoring::{FeatureMap, RawScoringResponse, ScoringRequest, ScoringResponse, ScoringResult};
pub use transaction::{ForeignFlag, Transaction, TransactionStatus};

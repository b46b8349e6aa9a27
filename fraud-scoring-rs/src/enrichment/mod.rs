//! Feature enrichment
//!
//! Fills in risk features the caller left out before a transaction is sent
//! for scoring. Values the caller supplied are never replaced.

mod account_age;

pub use account_age::{
    AccountAgeEstimator, HashedAccountAge, SeededAccountAge, MAX_ESTIMATED_ACCOUNT_AGE_DAYS,
};

use std::sync::Arc;

use crate::types::{FeatureMap, ForeignFlag, Transaction};

/// Separator between an account's namespace token and the rest of its id
const NAMESPACE_SEPARATOR: char = '-';

/// Fills missing optional features on a transaction
#[derive(Clone)]
pub struct FeatureDeriver {
    account_ages: Arc<dyn AccountAgeEstimator>,
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self::new(Arc::new(HashedAccountAge))
    }
}

impl std::fmt::Debug for FeatureDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDeriver").finish_non_exhaustive()
    }
}

impl FeatureDeriver {
    pub fn new(account_ages: Arc<dyn AccountAgeEstimator>) -> Self {
        Self { account_ages }
    }

    /// Return an enriched copy of `transaction`
    pub fn enrich(&self, transaction: &Transaction) -> Transaction {
        let mut enriched = transaction.clone();
        self.enrich_in_place(&mut enriched);
        enriched
    }

    /// Fill every unset optional feature of `transaction`
    pub fn enrich_in_place(&self, transaction: &mut Transaction) {
        if !is_set(transaction.user_account_age_days) {
            transaction.user_account_age_days =
                Some(self.account_ages.estimate_days(&transaction.sender_id));
        }

        if !is_set(transaction.recipient_account_age_days) {
            transaction.recipient_account_age_days =
                Some(self.account_ages.estimate_days(&transaction.recipient_id));
        }

        if transaction.is_foreign_transaction.is_unknown() {
            let foreign = namespace(&transaction.sender_id) != namespace(&transaction.recipient_id);
            transaction.is_foreign_transaction = ForeignFlag::from(foreign);
        }
    }
}

/// An account age counts as supplied only when it is a positive finite number
fn is_set(age: Option<f64>) -> bool {
    matches!(age, Some(days) if days.is_finite() && days > 0.0)
}

/// Leading namespace token of an account id, or the whole id if it has none
fn namespace(account_id: &str) -> &str {
    account_id
        .split(NAMESPACE_SEPARATOR)
        .next()
        .unwrap_or(account_id)
}

/// Build the feature map sent to the engine.
///
/// Optional features appear only when they carry a value.
pub fn feature_map(transaction: &Transaction) -> FeatureMap {
    let mut features = FeatureMap::new();
    features.insert("amount".to_string(), transaction.amount);
    features.insert("hour_of_day".to_string(), f64::from(transaction.hour_of_day));
    features.insert("time_since_last_tx".to_string(), transaction.time_since_last_tx);
    features.insert("recipient_frequency".to_string(), transaction.recipient_frequency);
    features.insert(
        "distance_to_recipient_km".to_string(),
        transaction.distance_to_recipient_km,
    );

    if let Some(days) = transaction.user_account_age_days.filter(|days| *days > 0.0) {
        features.insert("user_account_age_days".to_string(), days);
    }
    if let Some(days) = transaction.recipient_account_age_days.filter(|days| *days > 0.0) {
        features.insert("recipient_account_age_days".to_string(), days);
    }
    if let Some(flag) = transaction.is_foreign_transaction.as_feature() {
        features.insert("is_foreign_transaction".to_string(), flag);
    }

    features
}

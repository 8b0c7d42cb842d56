//! Feature engineering for fraud model training and scoring.
//!
//! Derives balance differences, zero-balance error flags, the amount to
//! balance ratio, and one indicator per transaction type. Training and
//! scoring share this module so the two paths cannot diverge.

use crate::error::{MonitorError, Result};
use crate::types::features::{
    EngineeredRecord, FeatureSet, TypeVocabulary, UnseenTypePolicy, MODEL_NUMERIC_COLUMNS,
    REQUIRED_SOURCE_COLUMNS,
};
use crate::types::transaction::Transaction;
use tracing::{debug, warn};

/// Smoothing constant added to the origin balance before dividing.
const RATIO_SMOOTHING: f64 = 1.0;

/// Transforms raw transactions into the engineered feature set.
///
/// The type vocabulary is fixed at construction, so a scoring batch is
/// always encoded with the columns the model was trained on.
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    vocabulary: TypeVocabulary,
    unseen_policy: UnseenTypePolicy,
}

impl FeatureEngineer {
    /// Create an engineer for a fixed vocabulary.
    pub fn new(vocabulary: TypeVocabulary, unseen_policy: UnseenTypePolicy) -> Self {
        Self {
            vocabulary,
            unseen_policy,
        }
    }

    /// Learn the vocabulary from a training batch.
    pub fn fit(records: &[Transaction]) -> Self {
        Self::new(TypeVocabulary::fit(records), UnseenTypePolicy::Reject)
    }

    pub fn vocabulary(&self) -> &TypeVocabulary {
        &self.vocabulary
    }

    /// Engineer every record. Row count is preserved; input is untouched.
    pub fn engineer(&self, records: &[Transaction]) -> Result<FeatureSet> {
        let mut unseen = 0usize;
        let engineered = records
            .iter()
            .map(|tx| {
                let record = self.engineer_one(tx)?;
                if record.type_indicators.iter().all(|&flag| flag == 0) {
                    unseen += 1;
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;

        if unseen > 0 {
            warn!(
                rows = unseen,
                "Transaction types outside the training vocabulary encoded as all-zero"
            );
        }
        debug!(
            rows = engineered.len(),
            features = self.feature_count(),
            "Features engineered"
        );

        Ok(FeatureSet::new(self.vocabulary.clone(), engineered))
    }

    fn engineer_one(&self, tx: &Transaction) -> Result<EngineeredRecord> {
        let mut type_indicators = vec![0u8; self.vocabulary.len()];
        match self.vocabulary.index_of(&tx.tx_type) {
            Some(idx) => type_indicators[idx] = 1,
            None => match self.unseen_policy {
                UnseenTypePolicy::Reject => {
                    return Err(MonitorError::UnseenCategory(tx.tx_type.clone()))
                }
                UnseenTypePolicy::ZeroFill => {}
            },
        }

        Ok(EngineeredRecord {
            source: tx.clone(),
            balance_diff_orig: difference(tx.old_balance_orig, tx.new_balance_orig),
            balance_diff_dest: difference(tx.new_balance_dest, tx.old_balance_dest),
            error_balance_orig: zero_to_zero(tx.old_balance_orig, tx.new_balance_orig),
            error_balance_dest: zero_to_zero(tx.old_balance_dest, tx.new_balance_dest),
            amount_to_balance_ratio: tx
                .amount
                .zip(tx.old_balance_orig)
                .map(|(amount, balance)| amount / (balance + RATIO_SMOOTHING)),
            type_indicators,
        })
    }

    /// Number of model input columns produced.
    pub fn feature_count(&self) -> usize {
        MODEL_NUMERIC_COLUMNS.len() + self.vocabulary.len()
    }
}

fn difference(minuend: Option<f64>, subtrahend: Option<f64>) -> Option<f64> {
    minuend.zip(subtrahend).map(|(a, b)| a - b)
}

/// 1 when the balance was zero both before and after. Missing never counts.
fn zero_to_zero(before: Option<f64>, after: Option<f64>) -> u8 {
    u8::from(before == Some(0.0) && after == Some(0.0))
}

/// Engineer a batch with a vocabulary learned from that same batch.
pub fn engineer_features(records: &[Transaction]) -> Result<FeatureSet> {
    FeatureEngineer::fit(records).engineer(records)
}

/// Check a CSV header for the source columns feature engineering needs.
pub fn require_source_columns(header: &csv::StringRecord, origin: &str) -> Result<()> {
    for column in REQUIRED_SOURCE_COLUMNS {
        if !header.iter().any(|h| h.trim() == column) {
            return Err(MonitorError::missing_column(column, origin));
        }
    }
    Ok(())
}

//! Engineered feature set and the shared column vocabulary

use crate::error::{MonitorError, Result};
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every numeric column of the engineered feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NumericColumn {
    #[serde(rename = "step")]
    Step,
    #[serde(rename = "amount")]
    Amount,
    #[serde(rename = "oldbalanceOrg")]
    OldBalanceOrig,
    #[serde(rename = "newbalanceOrig")]
    NewBalanceOrig,
    #[serde(rename = "oldbalanceDest")]
    OldBalanceDest,
    #[serde(rename = "newbalanceDest")]
    NewBalanceDest,
    #[serde(rename = "balance_diff_orig")]
    BalanceDiffOrig,
    #[serde(rename = "balance_diff_dest")]
    BalanceDiffDest,
    #[serde(rename = "error_balance_orig")]
    ErrorBalanceOrig,
    #[serde(rename = "error_balance_dest")]
    ErrorBalanceDest,
    #[serde(rename = "amount_to_balance_ratio")]
    AmountToBalanceRatio,
}

/// Continuous columns used for imputation, outlier filtering and drift.
///
/// Training, scoring and evaluation all read this list.
pub const TRACKED_NUMERIC_COLUMNS: [NumericColumn; 9] = [
    NumericColumn::Step,
    NumericColumn::Amount,
    NumericColumn::OldBalanceOrig,
    NumericColumn::NewBalanceOrig,
    NumericColumn::OldBalanceDest,
    NumericColumn::NewBalanceDest,
    NumericColumn::BalanceDiffOrig,
    NumericColumn::BalanceDiffDest,
    NumericColumn::AmountToBalanceRatio,
];

/// Numeric model inputs in matrix order; type indicators follow.
pub const MODEL_NUMERIC_COLUMNS: [NumericColumn; 11] = [
    NumericColumn::Step,
    NumericColumn::Amount,
    NumericColumn::OldBalanceOrig,
    NumericColumn::NewBalanceOrig,
    NumericColumn::OldBalanceDest,
    NumericColumn::NewBalanceDest,
    NumericColumn::BalanceDiffOrig,
    NumericColumn::BalanceDiffDest,
    NumericColumn::ErrorBalanceOrig,
    NumericColumn::ErrorBalanceDest,
    NumericColumn::AmountToBalanceRatio,
];

/// Source columns the feature engineer cannot work without.
pub const REQUIRED_SOURCE_COLUMNS: [&str; 6] = [
    "oldbalanceOrg",
    "newbalanceOrig",
    "oldbalanceDest",
    "newbalanceDest",
    "amount",
    "type",
];

impl NumericColumn {
    pub const ALL: [NumericColumn; 11] = MODEL_NUMERIC_COLUMNS;

    /// Column name as it appears in CSV files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Amount => "amount",
            Self::OldBalanceOrig => "oldbalanceOrg",
            Self::NewBalanceOrig => "newbalanceOrig",
            Self::OldBalanceDest => "oldbalanceDest",
            Self::NewBalanceDest => "newbalanceDest",
            Self::BalanceDiffOrig => "balance_diff_orig",
            Self::BalanceDiffDest => "balance_diff_dest",
            Self::ErrorBalanceOrig => "error_balance_orig",
            Self::ErrorBalanceDest => "error_balance_dest",
            Self::AmountToBalanceRatio => "amount_to_balance_ratio",
        }
    }
}

impl fmt::Display for NumericColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericColumn {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| MonitorError::missing_column(s, "numeric column set"))
    }
}

/// Binary label column used to split fraud from legitimate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelColumn {
    #[default]
    #[serde(rename = "isFraud")]
    IsFraud,
    #[serde(rename = "isFlaggedFraud")]
    IsFlaggedFraud,
}

impl LabelColumn {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsFraud => "isFraud",
            Self::IsFlaggedFraud => "isFlaggedFraud",
        }
    }

    pub fn of(&self, tx: &Transaction) -> Option<u8> {
        match self {
            Self::IsFraud => tx.is_fraud,
            Self::IsFlaggedFraud => tx.is_flagged_fraud,
        }
    }
}

/// How prediction-time data treats a type absent from the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnseenTypePolicy {
    /// Fail the whole batch
    #[default]
    Reject,
    /// Encode with every indicator set to 0
    ZeroFill,
}

/// Sorted transaction types that define the one-hot columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeVocabulary(Vec<String>);

impl TypeVocabulary {
    /// Collect the distinct types of a batch, sorted.
    pub fn fit(records: &[Transaction]) -> Self {
        let mut types: Vec<String> = records.iter().map(|r| r.tx_type.clone()).collect();
        types.sort();
        types.dedup();
        Self(types)
    }

    pub fn from_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut types: Vec<String> = types.into_iter().map(Into::into).collect();
        types.sort();
        types.dedup();
        Self(types)
    }

    pub fn index_of(&self, tx_type: &str) -> Option<usize> {
        self.0.binary_search_by(|t| t.as_str().cmp(tx_type)).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn types(&self) -> &[String] {
        &self.0
    }

    /// Indicator column names (`type_<VALUE>`)
    pub fn column_names(&self) -> Vec<String> {
        self.0.iter().map(|t| format!("type_{}", t)).collect()
    }
}

/// A transaction together with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub source: Transaction,
    pub balance_diff_orig: Option<f64>,
    pub balance_diff_dest: Option<f64>,
    pub error_balance_orig: u8,
    pub error_balance_dest: u8,
    pub amount_to_balance_ratio: Option<f64>,
    /// One entry per vocabulary type, in vocabulary order
    pub type_indicators: Vec<u8>,
}

impl EngineeredRecord {
    /// Read a numeric column
    pub fn value(&self, column: NumericColumn) -> Option<f64> {
        match column {
            NumericColumn::Step => self.source.step,
            NumericColumn::Amount => self.source.amount,
            NumericColumn::OldBalanceOrig => self.source.old_balance_orig,
            NumericColumn::NewBalanceOrig => self.source.new_balance_orig,
            NumericColumn::OldBalanceDest => self.source.old_balance_dest,
            NumericColumn::NewBalanceDest => self.source.new_balance_dest,
            NumericColumn::BalanceDiffOrig => self.balance_diff_orig,
            NumericColumn::BalanceDiffDest => self.balance_diff_dest,
            NumericColumn::ErrorBalanceOrig => Some(f64::from(self.error_balance_orig)),
            NumericColumn::ErrorBalanceDest => Some(f64::from(self.error_balance_dest)),
            NumericColumn::AmountToBalanceRatio => self.amount_to_balance_ratio,
        }
    }

    /// Replace a missing numeric value; flags are never missing and are left alone.
    pub(crate) fn fill(&mut self, column: NumericColumn, fill_value: f64) {
        let slot = match column {
            NumericColumn::Step => &mut self.source.step,
            NumericColumn::Amount => &mut self.source.amount,
            NumericColumn::OldBalanceOrig => &mut self.source.old_balance_orig,
            NumericColumn::NewBalanceOrig => &mut self.source.new_balance_orig,
            NumericColumn::OldBalanceDest => &mut self.source.old_balance_dest,
            NumericColumn::NewBalanceDest => &mut self.source.new_balance_dest,
            NumericColumn::BalanceDiffOrig => &mut self.balance_diff_orig,
            NumericColumn::BalanceDiffDest => &mut self.balance_diff_dest,
            NumericColumn::AmountToBalanceRatio => &mut self.amount_to_balance_ratio,
            NumericColumn::ErrorBalanceOrig | NumericColumn::ErrorBalanceDest => return,
        };
        if slot.is_none() {
            *slot = Some(fill_value);
        }
    }

    pub fn label(&self, label: LabelColumn) -> Option<u8> {
        label.of(&self.source)
    }
}

/// Output of the feature engineer: records plus the vocabulary they were encoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub vocabulary: TypeVocabulary,
    pub records: Vec<EngineeredRecord>,
}

impl FeatureSet {
    pub fn new(vocabulary: TypeVocabulary, records: Vec<EngineeredRecord>) -> Self {
        Self {
            vocabulary,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All values of a column, missing cells included
    pub fn column(&self, column: NumericColumn) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.value(column)).collect()
    }

    /// Observed (non-missing) values of a column
    pub fn observed(&self, column: NumericColumn) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.value(column)).collect()
    }

    pub fn labels(&self, label: LabelColumn) -> Vec<Option<u8>> {
        self.records.iter().map(|r| r.label(label)).collect()
    }

    /// Model input names in matrix order
    pub fn feature_names(&self) -> Vec<String> {
        MODEL_NUMERIC_COLUMNS
            .iter()
            .map(|c| c.name().to_string())
            .chain(self.vocabulary.column_names())
            .collect()
    }

    /// Dense model input matrix; missing values must be imputed first.
    pub fn feature_matrix(&self) -> Result<Vec<Vec<f64>>> {
        self.records
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(MODEL_NUMERIC_COLUMNS.len() + self.vocabulary.len());
                for column in MODEL_NUMERIC_COLUMNS {
                    let value = record.value(column).ok_or_else(|| MonitorError::InvalidValue {
                        column: column.name().to_string(),
                        value: "<missing>".to_string(),
                    })?;
                    row.push(value);
                }
                row.extend(record.type_indicators.iter().map(|&flag| f64::from(flag)));
                Ok(row)
            })
            .collect()
    }
}

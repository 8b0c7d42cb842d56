//! Exploratory statistics over the transactions dataset

use crate::stats;
use crate::types::features::{FeatureSet, LabelColumn, NumericColumn};
use crate::types::transaction::Transaction;
use std::collections::BTreeMap;
use tracing::info;

/// Source columns in file order, as counted by the profile
const SOURCE_COLUMNS: [&str; 11] = [
    "step",
    "type",
    "amount",
    "nameOrig",
    "oldbalanceOrg",
    "newbalanceOrig",
    "nameDest",
    "oldbalanceDest",
    "newbalanceDest",
    "isFraud",
    "isFlaggedFraud",
];

fn is_missing(tx: &Transaction, column: &str) -> bool {
    match column {
        "step" => tx.step.is_none(),
        "type" => tx.tx_type.is_empty(),
        "amount" => tx.amount.is_none(),
        "nameOrig" => tx.name_orig.is_empty(),
        "oldbalanceOrg" => tx.old_balance_orig.is_none(),
        "newbalanceOrig" => tx.new_balance_orig.is_none(),
        "nameDest" => tx.name_dest.is_empty(),
        "oldbalanceDest" => tx.old_balance_dest.is_none(),
        "newbalanceDest" => tx.new_balance_dest.is_none(),
        "isFraud" => tx.is_fraud.is_none(),
        "isFlaggedFraud" => tx.is_flagged_fraud.is_none(),
        _ => false,
    }
}

/// Shape of the dataset and its missing cells
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: usize,
    /// Missing cells per source column, in file order
    pub missing: Vec<(&'static str, usize)>,
}

impl DatasetProfile {
    pub fn of(records: &[Transaction]) -> Self {
        let missing = SOURCE_COLUMNS
            .iter()
            .map(|&column| {
                let count = records.iter().filter(|tx| is_missing(tx, column)).count();
                (column, count)
            })
            .collect();
        Self {
            rows: records.len(),
            columns: SOURCE_COLUMNS.len(),
            missing,
        }
    }

    pub fn total_missing(&self) -> usize {
        self.missing.iter().map(|(_, n)| n).sum()
    }

    pub fn print(&self) {
        info!(rows = self.rows, columns = self.columns, "Dataset shape");
        for (column, count) in &self.missing {
            if *count > 0 {
                info!(column, missing = count, "Missing values");
            }
        }
        if self.total_missing() == 0 {
            info!("No missing values");
        }
    }
}

/// Percentage of rows per label value; rows without a label are counted
/// under `None`.
pub fn class_distribution(records: &[Transaction], label: LabelColumn) -> BTreeMap<Option<u8>, f64> {
    let mut counts: BTreeMap<Option<u8>, usize> = BTreeMap::new();
    for tx in records {
        *counts.entry(label.of(tx)).or_default() += 1;
    }
    let total = records.len() as f64;
    counts
        .into_iter()
        .map(|(class, n)| (class, n as f64 * 100.0 / total))
        .collect()
}

/// Summary statistics for one numeric column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub column: NumericColumn,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

/// Describe each column over its observed values; all-missing columns are skipped.
pub fn describe(set: &FeatureSet, columns: &[NumericColumn]) -> Vec<ColumnSummary> {
    columns
        .iter()
        .filter_map(|&column| {
            let values = set.observed(column);
            let sorted = stats::sorted(&values);
            Some(ColumnSummary {
                column,
                count: values.len(),
                mean: stats::mean(&values)?,
                min: *sorted.first()?,
                median: stats::median(&values)?,
                max: *sorted.last()?,
            })
        })
        .collect()
}

/// Pairwise Pearson correlations
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<NumericColumn>,
    /// Row-major; `None` where a side has no variance
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: NumericColumn, b: NumericColumn) -> Option<f64> {
        let i = self.columns.iter().position(|&c| c == a)?;
        let j = self.columns.iter().position(|&c| c == b)?;
        self.values[i][j]
    }
}

/// Correlation of every column pair over rows where both values are observed.
pub fn correlation_matrix(set: &FeatureSet, columns: &[NumericColumn]) -> CorrelationMatrix {
    let values = columns
        .iter()
        .map(|&a| {
            columns
                .iter()
                .map(|&b| {
                    let (x, y): (Vec<f64>, Vec<f64>) = set
                        .records
                        .iter()
                        .filter_map(|r| Some((r.value(a)?, r.value(b)?)))
                        .unzip();
                    stats::pearson(&x, &y)
                })
                .collect()
        })
        .collect();
    CorrelationMatrix {
        columns: columns.to_vec(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineer::engineer_features;

    #[test]
    fn test_profile_counts_missing() {
        let mut tx = Transaction::new("PAYMENT", 10.0);
        tx.amount = None;
        tx.is_fraud = None;
        let profile = DatasetProfile::of(&[tx, Transaction::new("CASH_OUT", 5.0)]);

        assert_eq!(profile.rows, 2);
        assert_eq!(profile.columns, 11);
        assert!(profile.missing.contains(&("amount", 1)));
        assert!(profile.missing.contains(&("isFraud", 1)));
        // Builder leaves both account names empty
        assert_eq!(profile.total_missing(), 6);
    }

    #[test]
    fn test_class_distribution_percentages() {
        let records = vec![
            Transaction::new("PAYMENT", 1.0),
            Transaction::new("PAYMENT", 2.0),
            Transaction::new("PAYMENT", 3.0),
            Transaction::new("TRANSFER", 4.0).with_label(1),
        ];
        let distribution = class_distribution(&records, LabelColumn::IsFraud);
        assert_eq!(distribution[&Some(0)], 75.0);
        assert_eq!(distribution[&Some(1)], 25.0);
        assert_eq!(distribution.len(), 2);
    }

    #[test]
    fn test_correlation_matrix() {
        let records: Vec<Transaction> = (1..=5)
            .map(|i| {
                let amount = i as f64 * 10.0;
                Transaction::new("PAYMENT", amount).with_origin(amount * 2.0, 0.0)
            })
            .collect();
        let set = engineer_features(&records).unwrap();
        let columns = [NumericColumn::Amount, NumericColumn::OldBalanceOrig, NumericColumn::Step];
        let matrix = correlation_matrix(&set, &columns);

        let r = matrix.get(NumericColumn::Amount, NumericColumn::OldBalanceOrig).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        // Step is constant in this data
        assert_eq!(matrix.get(NumericColumn::Amount, NumericColumn::Step), None);
    }

    #[test]
    fn test_describe() {
        let records: Vec<Transaction> =
            [1.0, 2.0, 6.0].iter().map(|&a| Transaction::new("PAYMENT", a)).collect();
        let set = engineer_features(&records).unwrap();
        let summary = describe(&set, &[NumericColumn::Amount]);
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[0].mean, 3.0);
        assert_eq!(summary[0].median, 2.0);
        assert_eq!(summary[0].max, 6.0);
    }
}

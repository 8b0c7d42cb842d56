//! IQR outlier removal restricted to the legitimate class.
//!
//! Fraud rows are rare and informative, so they are never filtered. Legit
//! rows are narrowed column by column: each column's bounds are computed on
//! the rows that survived the previous columns, which makes the result
//! depend on column order.

use crate::error::{MonitorError, Result};
use crate::stats;
use crate::types::features::{EngineeredRecord, FeatureSet, LabelColumn, NumericColumn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Seed used for the final shuffle unless the caller picks another.
pub const DEFAULT_SHUFFLE_SEED: u64 = 42;

const IQR_FACTOR: f64 = 1.5;

/// Inclusive range kept for one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Bounds from observed values; `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = stats::sorted(values);
        let q1 = stats::quantile_sorted(&sorted, 0.25);
        let q3 = stats::quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - IQR_FACTOR * iqr,
            upper: q3 + IQR_FACTOR * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Remove legit-class outliers on `columns`, keep every fraud row, shuffle.
///
/// Rows whose label is missing or not 0/1 are dropped, as are legit rows
/// with a missing value in a filtered column.
pub fn remove_outliers_iqr(
    set: &FeatureSet,
    columns: &[NumericColumn],
    label: LabelColumn,
    seed: u64,
) -> Result<FeatureSet> {
    let mut fraud: Vec<&EngineeredRecord> = Vec::new();
    let mut legit: Vec<&EngineeredRecord> = Vec::new();
    for record in &set.records {
        match record.label(label) {
            Some(1) => fraud.push(record),
            Some(0) => legit.push(record),
            _ => {}
        }
    }

    let legit_before = legit.len();
    for &column in columns {
        if legit.is_empty() {
            break;
        }
        let observed: Vec<f64> = legit.iter().filter_map(|r| r.value(column)).collect();
        let bounds = IqrBounds::from_values(&observed).ok_or_else(|| {
            MonitorError::fit(
                format!("IQR bounds for `{}`", column),
                "no observed values among legitimate rows",
            )
        })?;
        legit.retain(|r| r.value(column).is_some_and(|v| bounds.contains(v)));
        debug!(
            column = %column,
            lower = bounds.lower,
            upper = bounds.upper,
            remaining = legit.len(),
            "Applied IQR filter"
        );
    }

    debug!(
        label = label.name(),
        legit_before,
        legit_after = legit.len(),
        fraud = fraud.len(),
        "Outlier removal complete"
    );

    let mut records: Vec<EngineeredRecord> =
        legit.into_iter().chain(fraud).cloned().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);

    Ok(FeatureSet::new(set.vocabulary.clone(), records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineer::engineer_features;
    use crate::types::transaction::Transaction;

    fn dataset(amounts: &[(f64, u8)]) -> FeatureSet {
        let records: Vec<Transaction> = amounts
            .iter()
            .map(|&(amount, label)| {
                Transaction::new("PAYMENT", amount)
                    .with_origin(1000.0, 1000.0 - amount)
                    .with_label(label)
            })
            .collect();
        engineer_features(&records).unwrap()
    }

    fn amounts(set: &FeatureSet, label: u8) -> Vec<f64> {
        let mut values: Vec<f64> = set
            .records
            .iter()
            .filter(|r| r.label(LabelColumn::IsFraud) == Some(label))
            .filter_map(|r| r.value(NumericColumn::Amount))
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values
    }

    #[test]
    fn test_fraud_rows_always_kept() {
        let set = dataset(&[
            (10.0, 0),
            (11.0, 0),
            (12.0, 0),
            (13.0, 0),
            (900.0, 0),
            (5000.0, 1),
            (1.0, 1),
        ]);
        let filtered =
            remove_outliers_iqr(&set, &[NumericColumn::Amount], LabelColumn::IsFraud, 42).unwrap();

        assert_eq!(amounts(&filtered, 1), vec![1.0, 5000.0]);
        assert_eq!(amounts(&filtered, 0), vec![10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_zero_iqr_keeps_exact_matches() {
        let set = dataset(&[(5.0, 0), (5.0, 0), (5.0, 0), (5.0, 0), (6.0, 0)]);
        let filtered =
            remove_outliers_iqr(&set, &[NumericColumn::Amount], LabelColumn::IsFraud, 7).unwrap();
        assert_eq!(amounts(&filtered, 0), vec![5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_more_columns_never_adds_legit_rows() {
        let set = dataset(&[
            (10.0, 0),
            (20.0, 0),
            (30.0, 0),
            (40.0, 0),
            (50.0, 0),
            (400.0, 0),
            (999.0, 0),
            (70.0, 1),
        ]);
        let one = remove_outliers_iqr(&set, &[NumericColumn::Amount], LabelColumn::IsFraud, 1)
            .unwrap();
        let two = remove_outliers_iqr(
            &set,
            &[NumericColumn::Amount, NumericColumn::AmountToBalanceRatio],
            LabelColumn::IsFraud,
            1,
        )
        .unwrap();
        assert!(amounts(&two, 0).len() <= amounts(&one, 0).len());
        assert!(amounts(&one, 0).len() <= amounts(&set, 0).len());
    }

    #[test]
    fn test_bounds_follow_column_order() {
        let rows = [(6.0, 4.0), (4.0, 50.0), (5.0, 1.0), (8.0, 100.0), (2.0, 3.0), (5.0, 2.0)];
        let records: Vec<Transaction> = rows
            .iter()
            .map(|&(step, amount)| {
                let mut tx = Transaction::new("PAYMENT", amount);
                tx.step = Some(step);
                tx
            })
            .collect();
        let set = engineer_features(&records).unwrap();
        let filter = |columns: &[NumericColumn]| {
            remove_outliers_iqr(&set, columns, LabelColumn::IsFraud, 42).unwrap()
        };

        // amount drops 100; step bounds on the rest are [2.5, 6.5], dropping step 2
        let amount_first = filter(&[NumericColumn::Amount, NumericColumn::Step]);
        assert_eq!(amounts(&amount_first, 0), vec![1.0, 2.0, 4.0, 50.0]);

        // step bounds on all six rows are [2, 8], so only amount 100 goes
        let step_first = filter(&[NumericColumn::Step, NumericColumn::Amount]);
        assert_eq!(amounts(&step_first, 0), vec![1.0, 2.0, 3.0, 4.0, 50.0]);
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let set = dataset(&[(1.0, 0), (2.0, 0), (3.0, 0), (4.0, 1), (5.0, 1), (6.0, 0)]);
        let a = remove_outliers_iqr(&set, &[], LabelColumn::IsFraud, 42).unwrap();
        let b = remove_outliers_iqr(&set, &[], LabelColumn::IsFraud, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), set.len());
    }

    #[test]
    fn test_unobserved_column_is_fit_error() {
        let mut set = dataset(&[(1.0, 0), (2.0, 0)]);
        for record in &mut set.records {
            record.source.step = None;
        }
        let err =
            remove_outliers_iqr(&set, &[NumericColumn::Step], LabelColumn::IsFraud, 42).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Fit);
    }

    #[test]
    fn test_bounds() {
        let bounds = IqrBounds::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(bounds.q1, 1.75);
        assert_eq!(bounds.q3, 3.25);
        assert_eq!(bounds.lower, 1.75 - 1.5 * 1.5);
        assert!(bounds.contains(bounds.upper));
    }
}

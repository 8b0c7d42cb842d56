//! Model training on an engineered, imputed and filtered feature set

use crate::error::{MonitorError, Result};
use crate::metrics::ClassificationReport;
use crate::models::artifact::{ModelArtifact, ValidationSummary};
use crate::models::forest::{Classifier, ForestParams, RandomForest};
use crate::types::features::{FeatureSet, LabelColumn};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};
use uuid::Uuid;

/// Split row indices into train and test, preserving class proportions.
///
/// Each class contributes `round(test_size * class_rows)` test rows, at
/// least one when the class has two or more rows.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let mut n_test = (members.len() as f64 * test_size).round() as usize;
        if members.len() >= 2 {
            n_test = n_test.clamp(1, members.len() - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Trained artifact plus its hold-out report
#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub validation: ClassificationReport,
}

/// Fits the forest and measures it on a stratified hold-out split
#[derive(Debug, Clone)]
pub struct Trainer {
    params: ForestParams,
    test_size: f64,
    seed: u64,
}

impl Trainer {
    pub fn new(params: ForestParams, test_size: f64, seed: u64) -> Self {
        Self {
            params,
            test_size,
            seed,
        }
    }

    /// Train on every row with a 0/1 label; other rows are skipped.
    pub fn train(&self, set: &FeatureSet, label: LabelColumn) -> Result<TrainingOutcome> {
        let matrix = set.feature_matrix()?;
        let mut x = Vec::with_capacity(matrix.len());
        let mut y = Vec::with_capacity(matrix.len());
        let mut skipped = 0usize;
        for (row, record) in matrix.into_iter().zip(&set.records) {
            match record.label(label) {
                Some(value @ (0 | 1)) => {
                    x.push(row);
                    y.push(value);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(rows = skipped, label = label.name(), "Rows without a usable label skipped");
        }
        if y.is_empty() {
            return Err(MonitorError::fit("model", "no labelled rows to train on"));
        }

        let (train_idx, test_idx) = stratified_split(&y, self.test_size, self.seed);
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
            (
                idx.iter().map(|&i| x[i].clone()).collect(),
                idx.iter().map(|&i| y[i]).collect(),
            )
        };
        let (x_train, y_train) = pick(&train_idx);
        let (x_test, y_test) = pick(&test_idx);

        info!(
            train_rows = x_train.len(),
            test_rows = x_test.len(),
            features = set.feature_names().len(),
            trees = self.params.n_estimators,
            max_depth = self.params.max_depth,
            "Training random forest"
        );

        let forest = RandomForest::fit(&x_train, &y_train, &self.params)?;
        let proba = forest.predict_proba(&x_test)?;
        let predicted = forest.predict(&x_test)?;
        let validation = ClassificationReport::compute(&y_test, &proba, &predicted)?;

        info!(
            auc = validation.auc,
            precision = validation.precision,
            recall = validation.recall,
            f1 = validation.f1_score,
            "Hold-out validation complete"
        );

        let artifact = ModelArtifact {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            label,
            feature_names: set.feature_names(),
            vocabulary: set.vocabulary.clone(),
            validation: ValidationSummary {
                auc: validation.auc,
                precision: validation.precision,
                recall: validation.recall,
                f1_score: validation.f1_score,
                train_rows: x_train.len(),
                test_rows: x_test.len(),
            },
            forest,
        };

        Ok(TrainingOutcome {
            artifact,
            validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineer::engineer_features;
    use crate::types::transaction::Transaction;

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 10 == 0)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);

        assert_eq!(train.len() + test.len(), labels.len());
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 1);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 0).count(), 9);
        assert!(train.iter().any(|&i| labels[i] == 1));
        assert!(test.iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn test_train_produces_artifact() {
        let mut records = Vec::new();
        for i in 0..60 {
            let amount = 100.0 + i as f64;
            records.push(
                Transaction::new("PAYMENT", amount)
                    .with_origin(amount * 10.0, amount * 9.0)
                    .with_destination(0.0, 0.0),
            );
        }
        for i in 0..20 {
            let amount = 5000.0 + i as f64;
            records.push(
                Transaction::new("TRANSFER", amount)
                    .with_origin(amount, 0.0)
                    .with_destination(0.0, 0.0)
                    .with_label(1),
            );
        }
        let set = engineer_features(&records).unwrap();
        let params = ForestParams {
            n_estimators: 10,
            max_depth: 4,
            ..ForestParams::default()
        };
        let outcome = Trainer::new(params, 0.2, 42)
            .train(&set, LabelColumn::IsFraud)
            .unwrap();

        assert_eq!(outcome.artifact.validation.auc, 1.0);
        assert_eq!(outcome.artifact.validation.test_rows, 16);
        assert_eq!(outcome.artifact.feature_names, set.feature_names());
        assert_eq!(outcome.artifact.feature_importances().len(), set.feature_names().len());
    }
}

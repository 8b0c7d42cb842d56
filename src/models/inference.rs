//! Batch scoring with a persisted model and imputer

use crate::dataset::Prediction;
use crate::error::{MonitorError, Result};
use crate::feature_engineer::FeatureEngineer;
use crate::imputer::FittedImputer;
use crate::models::artifact::ModelArtifact;
use crate::models::forest::{Classifier, DECISION_THRESHOLD};
use crate::types::features::{FeatureSet, UnseenTypePolicy};
use crate::types::transaction::Transaction;
use std::path::Path;
use tracing::{debug, info};

/// Engineered rows and their predictions, in input order
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub features: FeatureSet,
    pub predictions: Vec<Prediction>,
}

impl ScoredBatch {
    pub fn flagged(&self) -> usize {
        self.predictions.iter().filter(|p| p.label == 1).count()
    }
}

/// Applies the training-time feature pipeline, then the model
pub struct InferenceEngine {
    model: ModelArtifact,
    engineer: FeatureEngineer,
    imputer: FittedImputer,
}

impl InferenceEngine {
    /// Build an engine around an already loaded model and imputer
    pub fn new(model: ModelArtifact, imputer: FittedImputer, unseen_policy: UnseenTypePolicy) -> Self {
        let engineer = FeatureEngineer::new(model.vocabulary.clone(), unseen_policy);
        info!(
            model_id = %model.model_id,
            features = model.feature_names.len(),
            unseen_policy = ?unseen_policy,
            "Inference engine initialized"
        );
        Self {
            model,
            engineer,
            imputer,
        }
    }

    /// Load both artifacts from disk
    pub fn load(model_path: &Path, imputer_path: &Path, unseen_policy: UnseenTypePolicy) -> Result<Self> {
        let model = ModelArtifact::load(model_path)?;
        let imputer = FittedImputer::load(imputer_path)?;
        Ok(Self::new(model, imputer, unseen_policy))
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    /// Engineer, impute and score a batch.
    pub fn score(&self, records: &[Transaction]) -> Result<ScoredBatch> {
        let engineered = self.engineer.engineer(records)?;
        let features = self.imputer.transform(&engineered);

        let names = features.feature_names();
        if names != self.model.feature_names {
            return Err(MonitorError::fit(
                "scoring",
                format!(
                    "feature layout {:?} does not match the model's {:?}",
                    names, self.model.feature_names
                ),
            ));
        }

        let matrix = features.feature_matrix()?;
        let probabilities = self.model.forest.predict_proba(&matrix)?;
        let predictions: Vec<Prediction> = probabilities
            .into_iter()
            .map(|proba| Prediction {
                proba,
                label: u8::from(proba > DECISION_THRESHOLD),
            })
            .collect();

        let batch = ScoredBatch {
            features,
            predictions,
        };
        debug!(
            rows = batch.predictions.len(),
            flagged = batch.flagged(),
            "Batch scored"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineer::engineer_features;
    use crate::imputer::{ImputeStrategy, Imputer};
    use crate::models::forest::ForestParams;
    use crate::models::trainer::Trainer;
    use crate::types::features::{LabelColumn, MODEL_NUMERIC_COLUMNS, TRACKED_NUMERIC_COLUMNS};

    fn training_records() -> Vec<Transaction> {
        let mut records = Vec::new();
        for i in 0..40 {
            let amount = 50.0 + i as f64;
            records.push(
                Transaction::new("PAYMENT", amount)
                    .with_origin(amount * 20.0, amount * 19.0)
                    .with_destination(0.0, 0.0),
            );
        }
        for i in 0..10 {
            let amount = 9000.0 + i as f64;
            records.push(
                Transaction::new("TRANSFER", amount)
                    .with_origin(amount, 0.0)
                    .with_destination(0.0, 0.0)
                    .with_label(1),
            );
        }
        records
    }

    fn engine(policy: UnseenTypePolicy) -> InferenceEngine {
        let set = engineer_features(&training_records()).unwrap();
        let imputer = Imputer::new(ImputeStrategy::Median)
            .fit(&set, &TRACKED_NUMERIC_COLUMNS)
            .unwrap();
        let params = ForestParams {
            n_estimators: 10,
            max_depth: 4,
            ..ForestParams::default()
        };
        let outcome = Trainer::new(params, 0.2, 42)
            .train(&set, LabelColumn::IsFraud)
            .unwrap();
        InferenceEngine::new(outcome.artifact, imputer, policy)
    }

    #[test]
    fn test_score_keeps_row_order() {
        let engine = engine(UnseenTypePolicy::Reject);
        let batch = engine
            .score(&[
                Transaction::new("TRANSFER", 9500.0).with_origin(9500.0, 0.0),
                Transaction::new("PAYMENT", 60.0).with_origin(1200.0, 1140.0),
            ])
            .unwrap();

        assert_eq!(batch.predictions.len(), 2);
        let labels: Vec<u8> = batch.predictions.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![1, 0]);
        assert!(batch.predictions.iter().all(|p| (0.0..=1.0).contains(&p.proba)));
        assert_eq!(batch.flagged(), 1);
    }

    #[test]
    fn test_missing_values_are_imputed() {
        let engine = engine(UnseenTypePolicy::Reject);
        let mut tx = Transaction::new("PAYMENT", 70.0);
        tx.old_balance_orig = None;
        let batch = engine.score(&[tx]).unwrap();
        assert!(batch.features.records[0]
            .value(crate::types::features::NumericColumn::OldBalanceOrig)
            .is_some());
    }

    #[test]
    fn test_unseen_type_policies() {
        let records = [Transaction::new("DEBIT", 10.0)];
        assert!(engine(UnseenTypePolicy::Reject).score(&records).is_err());
        let batch = engine(UnseenTypePolicy::ZeroFill).score(&records).unwrap();
        assert_eq!(batch.predictions.len(), 1);
    }

    #[test]
    fn test_model_exposes_training_baseline() {
        let engine = engine(UnseenTypePolicy::Reject);
        let model = engine.model();
        assert_eq!(
            model.feature_names.len(),
            MODEL_NUMERIC_COLUMNS.len() + model.vocabulary.len()
        );
        assert!(model.validation.auc > 0.9);
    }
}

//! Persisted model artifact

use crate::dataset::{read_file, FeatureImportance, StagedWrites};
use crate::error::{MonitorError, Result};
use crate::models::forest::RandomForest;
use crate::types::features::{LabelColumn, TypeVocabulary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Hold-out metrics recorded at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Baseline AUC of this model
    pub auc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Everything needed to score a new batch the way training saw it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Unique id of this training run
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub label: LabelColumn,
    /// Model input names in matrix order
    pub feature_names: Vec<String>,
    /// Type vocabulary the one-hot columns were built from
    pub vocabulary: TypeVocabulary,
    pub validation: ValidationSummary,
    pub forest: RandomForest,
}

impl ModelArtifact {
    /// Write the artifact, replacing any previous model
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writes = StagedWrites::new();
        self.stage(&mut writes, path)?;
        writes.commit()?;
        info!(
            model_id = %self.model_id,
            path = %path.display(),
            trees = self.forest.n_trees(),
            "Model artifact saved"
        );
        Ok(())
    }

    /// Serialize into a pending group of writes
    pub fn stage(&self, writes: &mut StagedWrites, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self).map_err(|source| MonitorError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        writes.stage(path, &json)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model artifact");

        let bytes = read_file(path)?;
        let artifact: Self =
            serde_json::from_slice(&bytes).map_err(|source| MonitorError::Artifact {
                path: path.to_path_buf(),
                source,
            })?;

        if artifact.feature_names.len() != artifact.forest.n_features() {
            return Err(MonitorError::fit(
                "model artifact",
                format!(
                    "{} feature names for a forest of width {}",
                    artifact.feature_names.len(),
                    artifact.forest.n_features()
                ),
            ));
        }

        info!(
            model_id = %artifact.model_id,
            trained_at = %artifact.trained_at,
            baseline_auc = artifact.validation.auc,
            "Model loaded successfully"
        );
        Ok(artifact)
    }

    /// Forest importances paired with feature names, most important first
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let mut rows: Vec<FeatureImportance> = self
            .feature_names
            .iter()
            .zip(self.forest.feature_importances())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        rows
    }
}

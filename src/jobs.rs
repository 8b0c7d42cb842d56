//! Scheduled jobs: weekly training, daily prediction, daily evaluation.
//!
//! Each job reads everything it needs before writing anything, so a failed
//! run leaves the previous artifacts and monitoring history untouched.

use crate::config::AppConfig;
use crate::dataset::{
    append_monitoring, feature_importance_csv, latest_monitoring, predictions_csv,
    predictions_path, read_monitoring, read_transactions, sample_records, warning_text,
    write_atomic, CsvTable, StagedWrites,
};
use crate::error::{MonitorError, Result};
use crate::feature_engineer::{engineer_features, FeatureEngineer};
use crate::imputer::{FittedImputer, Imputer};
use crate::metrics::ClassificationReport;
use crate::models::forest::ForestParams;
use crate::models::inference::InferenceEngine;
use crate::models::trainer::Trainer;
use crate::monitor::{
    check_drift, check_model_degradation, DegradationReport, DriftReport, MetricsSnapshot,
};
use crate::outliers::remove_outliers_iqr;
use crate::types::features::TRACKED_NUMERIC_COLUMNS;
use crate::types::monitoring::MonitoringRecord;
use crate::types::transaction::Transaction;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Result of the weekly training job
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub model_id: Uuid,
    pub rows_trained: usize,
    pub validation: ClassificationReport,
    /// Retrain policy verdict on the latest monitoring record
    pub retrain_recommended: bool,
}

/// Result of the daily prediction job
#[derive(Debug, Clone)]
pub struct PredictReport {
    pub path: PathBuf,
    pub rows: usize,
    pub flagged: usize,
}

/// Result of the daily evaluation job
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Row appended to the monitoring history
    pub record: MonitoringRecord,
    pub drift: DriftReport,
    /// AUC drop against the previous record, when there is one
    pub degradation: Option<DegradationReport>,
}

/// Runs jobs against one configuration
pub struct Jobs {
    config: AppConfig,
}

impl Jobs {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn load_dataset(&self) -> Result<Vec<Transaction>> {
        let records = read_transactions(&self.config.fraud_dataset)?;
        if records.is_empty() {
            return Err(MonitorError::EmptyDataset {
                path: self.config.fraud_dataset.clone(),
            });
        }
        Ok(records)
    }

    /// Retrain on the configured dataset and refresh the retrain warning.
    ///
    /// The model, the imputer, the feature-importance table and the warning
    /// file are staged together and only replace the previous ones once all
    /// four have been written.
    pub fn weekly_train(&self) -> Result<TrainReport> {
        let run_id = Uuid::new_v4();
        let _span = info_span!("weekly_train", %run_id).entered();
        let cfg = &self.config;
        let training = &cfg.training;

        let latest = latest_monitoring(&cfg.monitoring_metrics)?;
        let records = self.load_dataset()?;
        let sample = sample_records(&records, cfg.sample_size, cfg.random_state);
        info!(rows = sample.len(), total = records.len(), "Training sample drawn");

        let engineer = FeatureEngineer::fit(&sample);
        let engineered = engineer.engineer(&sample)?;
        let imputer = Imputer::new(training.imputation).fit(&engineered, &TRACKED_NUMERIC_COLUMNS)?;
        let mut features = imputer.transform(&engineered);
        info!(
            strategy = ?imputer.strategy(),
            columns = imputer.columns().count(),
            "Imputer fitted"
        );

        if training.filter_outliers {
            let before = features.len();
            features = remove_outliers_iqr(
                &features,
                &TRACKED_NUMERIC_COLUMNS,
                training.label,
                cfg.random_state,
            )?;
            info!(kept = features.len(), removed = before - features.len(), "Outliers filtered");
        }

        let params = ForestParams {
            seed: cfg.random_state,
            ..training.forest.clone()
        };
        let outcome =
            Trainer::new(params, training.test_size, cfg.random_state).train(&features, training.label)?;

        let retrain_recommended = cfg.monitor.retrain.should_retrain(MetricsSnapshot::from(&latest));

        let mut writes = StagedWrites::new();
        outcome.artifact.stage(&mut writes, &cfg.model_path)?;
        imputer.stage(&mut writes, &cfg.imputer_path)?;
        writes.stage(
            &cfg.shap_global,
            &feature_importance_csv(&outcome.artifact.feature_importances())?,
        )?;
        writes.stage(&cfg.warning_file, warning_text(retrain_recommended).as_bytes())?;
        let files = writes.len();
        writes.commit()?;
        info!(
            files,
            model = %cfg.model_path.display(),
            imputer = %cfg.imputer_path.display(),
            "Training artifacts written"
        );

        if retrain_recommended {
            warn!(
                latest_date = %latest.date,
                auc = latest.auc,
                drift_score = latest.drift_score,
                "Latest monitoring record recommends retraining"
            );
        }
        info!(
            model_id = %outcome.artifact.model_id,
            validation_auc = outcome.validation.auc,
            "Weekly training complete"
        );

        Ok(TrainReport {
            model_id: outcome.artifact.model_id,
            rows_trained: outcome.artifact.validation.train_rows,
            validation: outcome.validation,
            retrain_recommended,
        })
    }

    /// Score the configured dataset and write `predictions_<date>.csv`.
    pub fn daily_predict(&self, date: NaiveDate) -> Result<PredictReport> {
        let run_id = Uuid::new_v4();
        let _span = info_span!("daily_predict", %run_id, %date).entered();
        let cfg = &self.config;

        let engine = InferenceEngine::load(
            &cfg.model_path,
            &cfg.imputer_path,
            cfg.training.unseen_type_policy,
        )?;
        let model = engine.model();
        info!(
            model_id = %model.model_id,
            trained_at = %model.trained_at,
            baseline_auc = model.validation.auc,
            "Scoring with model"
        );
        let records = self.load_dataset()?;
        let batch = engine.score(&records)?;

        let bytes = predictions_csv(&batch.features, &batch.predictions)?;
        let path = predictions_path(&cfg.predictions_dir, date);
        write_atomic(&path, &bytes)?;

        let report = PredictReport {
            path,
            rows: batch.predictions.len(),
            flagged: batch.flagged(),
        };
        info!(
            path = %report.path.display(),
            rows = report.rows,
            flagged = report.flagged,
            "Daily predictions written"
        );
        Ok(report)
    }

    /// Evaluate the day's predictions and append one monitoring record.
    ///
    /// Drift compares the scored batch with the reference dataset run
    /// through the same engineering and imputation steps.
    pub fn daily_evaluate(&self, date: NaiveDate) -> Result<EvaluationOutcome> {
        let run_id = Uuid::new_v4();
        let _span = info_span!("daily_evaluate", %run_id, %date).entered();
        let cfg = &self.config;
        let label = cfg.training.label;

        let predictions = CsvTable::read(&predictions_path(&cfg.predictions_dir, date))?;
        let y_true = predictions.binary(label.name())?;
        let y_pred = predictions.binary("pred_label")?;
        let y_proba = predictions
            .numeric("pred_proba")?
            .into_iter()
            .map(|p| {
                p.ok_or_else(|| MonitorError::InvalidValue {
                    column: "pred_proba".to_string(),
                    value: String::new(),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let imputer = FittedImputer::load(&cfg.imputer_path)?;
        let reference = imputer.transform(&engineer_features(&self.load_dataset()?)?);

        let drift = check_drift(
            &predictions,
            &reference,
            &TRACKED_NUMERIC_COLUMNS,
            cfg.monitor.drift_threshold,
        )?;
        let report = ClassificationReport::compute(&y_true, &y_proba, &y_pred)?;
        let drift_score = drift.mean_score();

        let history = load_history(&cfg.monitoring_metrics)?;
        let degradation = match history.last() {
            Some(baseline) => {
                let check = check_model_degradation(
                    &y_true,
                    &y_proba,
                    baseline.auc,
                    cfg.monitor.degradation_threshold,
                )?;
                if check.retrain {
                    warn!(
                        baseline_auc = baseline.auc,
                        current_auc = check.current_auc,
                        auc_drop = check.auc_drop,
                        "Model degradation detected"
                    );
                }
                Some(check)
            }
            None => None,
        };

        let retrain_triggered = cfg.monitor.retrain.should_retrain(MetricsSnapshot {
            auc: report.auc,
            drift_score,
        });
        let record = MonitoringRecord {
            date,
            auc: report.auc,
            precision: report.precision,
            recall: report.recall,
            f1_score: report.f1_score,
            drift_score,
            retrain_triggered,
        };
        append_monitoring(&cfg.monitoring_metrics, &record)?;

        info!(
            auc = record.auc,
            f1 = record.f1_score,
            drift_score,
            drifted = drift.drifted_columns().len(),
            retrain_triggered,
            "Daily evaluation complete"
        );
        Ok(EvaluationOutcome {
            record,
            drift,
            degradation,
        })
    }
}

/// Monitoring history, empty when the file does not exist yet
fn load_history(path: &Path) -> Result<Vec<MonitoringRecord>> {
    match read_monitoring(path) {
        Ok(history) => Ok(history),
        Err(MonitorError::MissingFile { .. }) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

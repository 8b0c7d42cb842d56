//! Configuration management for the fraud monitor

use crate::error::{MonitorError, Result};
use crate::imputer::ImputeStrategy;
use crate::models::forest::ForestParams;
use crate::monitor::{RetrainPolicy, DEFAULT_DEGRADATION_THRESHOLD, DEFAULT_DRIFT_THRESHOLD};
use crate::types::features::{LabelColumn, UnseenTypePolicy};
use crate::types::monitoring::DriftBands;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File read by [`AppConfig::load`] when present
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

/// Separator between table and key in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Main application configuration.
///
/// Keys are the lower-case job variables; an environment variable such as
/// `FRAUD_DATASET` overrides `fraud_dataset` from the file. Nested keys use
/// a double underscore, so `MONITOR__DRIFT_THRESHOLD` overrides
/// `monitor.drift_threshold`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Transactions CSV used for training and as drift reference
    pub fraud_dataset: PathBuf,
    /// Model artifact location
    pub model_path: PathBuf,
    /// Append-only monitoring-metrics CSV
    pub monitoring_metrics: PathBuf,
    /// Global feature-importance CSV
    pub shap_global: PathBuf,
    /// Retrain warning text file
    pub warning_file: PathBuf,
    /// Rows sampled from the dataset before training
    pub sample_size: usize,
    /// Seed for sampling, splitting, shuffling and the forest
    pub random_state: u64,
    /// Persisted imputer fill values
    #[serde(default = "default_imputer_path")]
    pub imputer_path: PathBuf,
    /// Directory of `predictions_<date>.csv` files
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: PathBuf,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn environment() -> Environment {
    Environment::default()
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn default_imputer_path() -> PathBuf {
    PathBuf::from("models/imputer.json")
}

fn default_predictions_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Drift and degradation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Per-column Wasserstein threshold
    pub drift_threshold: f64,
    /// Tolerated AUC drop against the baseline
    pub degradation_threshold: f64,
    pub retrain: RetrainPolicy,
    /// Bands for the drift level shown in the summary
    pub drift_bands: DriftBands,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            degradation_threshold: DEFAULT_DEGRADATION_THRESHOLD,
            retrain: RetrainPolicy::default(),
            drift_bands: DriftBands::default(),
        }
    }
}

/// Training pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub forest: ForestParams,
    /// Hold-out fraction for validation
    pub test_size: f64,
    pub imputation: ImputeStrategy,
    /// Apply the IQR filter to legitimate rows before fitting
    pub filter_outliers: bool,
    pub label: LabelColumn,
    /// What scoring does with a transaction type unseen at training time
    pub unseen_type_policy: UnseenTypePolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_size: 0.2,
            imputation: ImputeStrategy::default(),
            filter_outliers: true,
            label: LabelColumn::default(),
            unseen_type_policy: UnseenTypePolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/monitor.toml` if it exists, overlaid by the environment
    pub fn load() -> Result<Self> {
        Self::build(
            File::with_name(DEFAULT_CONFIG_PATH).required(false),
            environment(),
        )
    }

    /// Load configuration from a specific path, overlaid by the environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MonitorError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        Self::build(File::from(path).required(true), environment())
    }

    fn build<S>(file: S, env: Environment) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build configuration: {}", e)))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| MonitorError::Config(format!("failed to deserialize configuration: {}", e)))?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings no job can run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MonitorError::Config(msg));

        if self.sample_size == 0 {
            return invalid("SAMPLE_SIZE must be positive".to_string());
        }
        if !(self.monitor.drift_threshold > 0.0) {
            return invalid(format!(
                "monitor.drift_threshold must be positive, got {}",
                self.monitor.drift_threshold
            ));
        }
        if !(self.monitor.degradation_threshold > 0.0) {
            return invalid(format!(
                "monitor.degradation_threshold must be positive, got {}",
                self.monitor.degradation_threshold
            ));
        }
        if !(self.monitor.retrain.auc_floor > 0.0 && self.monitor.retrain.drift_ceiling > 0.0) {
            return invalid("monitor.retrain bounds must be positive".to_string());
        }
        if self.monitor.drift_bands.low > self.monitor.drift_bands.moderate {
            return invalid("monitor.drift_bands.low exceeds moderate".to_string());
        }
        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            return invalid(format!(
                "training.test_size must be in (0, 1), got {}",
                self.training.test_size
            ));
        }
        if self.training.forest.n_estimators == 0 || self.training.forest.max_depth == 0 {
            return invalid("training.forest needs at least one tree of depth one".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
fraud_dataset = "data/fraud.csv"
model_path = "models/model.json"
monitoring_metrics = "data/monitoring_metrics.csv"
shap_global = "data/shap_global.csv"
warning_file = "data/retrain_warning.txt"
sample_size = 50000
random_state = 7
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = AppConfig::load_from_path(file.path()).unwrap();

        assert_eq!(config.fraud_dataset, PathBuf::from("data/fraud.csv"));
        assert_eq!(config.sample_size, 50000);
        assert_eq!(config.random_state, 7);
        assert_eq!(config.imputer_path, PathBuf::from("models/imputer.json"));
        assert_eq!(config.predictions_dir, PathBuf::from("data"));
        assert_eq!(config.monitor.drift_threshold, 0.1);
        assert_eq!(config.monitor.retrain, RetrainPolicy::default());
        assert_eq!(config.training.forest.n_estimators, 100);
        assert_eq!(config.training.imputation, ImputeStrategy::Median);
        assert_eq!(config.training.unseen_type_policy, UnseenTypePolicy::Reject);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_nested_tables() {
        let contents = format!(
            "{}\n[monitor]\ndrift_threshold = 0.2\n\n[training]\ntest_size = 0.3\nunseen_type_policy = \"zero_fill\"\n\n[training.forest]\nn_estimators = 25\n",
            MINIMAL
        );
        let file = write_config(&contents);
        let config = AppConfig::load_from_path(file.path()).unwrap();

        assert_eq!(config.monitor.drift_threshold, 0.2);
        assert_eq!(config.monitor.degradation_threshold, 0.05);
        assert_eq!(config.training.test_size, 0.3);
        assert_eq!(config.training.forest.n_estimators, 25);
        assert_eq!(config.training.forest.max_depth, 10);
        assert_eq!(config.training.unseen_type_policy, UnseenTypePolicy::ZeroFill);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        let file = write_config(MINIMAL);
        let vars = [
            ("MONITOR__DRIFT_THRESHOLD", "0.3"),
            ("MONITOR__RETRAIN__AUC_FLOOR", "0.9"),
            ("TRAINING__FOREST__N_ESTIMATORS", "12"),
            ("SAMPLE_SIZE", "500"),
        ];
        let env = environment().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        let config = AppConfig::build(File::from(file.path()), env).unwrap();

        assert_eq!(config.monitor.drift_threshold, 0.3);
        assert_eq!(config.monitor.retrain.auc_floor, 0.9);
        assert_eq!(config.monitor.retrain.drift_ceiling, 0.15);
        assert_eq!(config.training.forest.n_estimators, 12);
        assert_eq!(config.sample_size, 500);
        assert_eq!(config.random_state, 7);
    }

    #[test]
    fn test_missing_required_key() {
        let file = write_config("model_path = \"m.json\"\n");
        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load_from_path("does/not/exist.toml").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingFile);
    }

    #[test]
    fn test_validate_rejects_bad_test_size() {
        let file = write_config(&format!("{}\n[training]\ntest_size = 1.5\n", MINIMAL));
        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("test_size"));
    }
}

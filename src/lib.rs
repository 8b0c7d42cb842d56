//! Fraud Model Monitoring Library
//!
//! Feature engineering, outlier filtering and imputation for PaySim-style
//! transaction data, a random forest fraud classifier, and the drift and
//! degradation checks run by the scheduled train, predict and evaluate jobs.

pub mod config;
pub mod dataset;
pub mod eda;
pub mod error;
pub mod feature_engineer;
pub mod imputer;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod outliers;
pub mod stats;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, MonitorError, Result};
pub use feature_engineer::FeatureEngineer;
pub use jobs::Jobs;
pub use models::inference::InferenceEngine;
pub use monitor::{check_drift, check_model_degradation, ColumnSource, RetrainPolicy};
pub use types::{features::FeatureSet, monitoring::MonitoringRecord, transaction::Transaction};

//! Fraud Monitor - Main Entry Point
//!
//! Runs one scheduled job (train, predict, evaluate) or prints the dataset
//! profile or the monitoring summary, then exits.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use fraud_monitor::{
    config::{AppConfig, LoggingConfig},
    dataset::{read_feature_importance, read_monitoring, read_transactions, read_warning},
    eda::{class_distribution, correlation_matrix, describe, DatasetProfile},
    feature_engineer::engineer_features,
    jobs::Jobs,
    metrics::MonitoringSummary,
    types::features::TRACKED_NUMERIC_COLUMNS,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Number of feature importances shown by `summary`
const TOP_FEATURES: usize = 10;

/// Fraud model monitoring: scheduled training, scoring and evaluation
#[derive(Debug, Parser)]
#[command(name = "fraud-monitor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to config/monitor.toml)
    #[arg(short, long, global = true, env = "FRAUD_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrain on the configured dataset and refresh the retrain warning
    Train,
    /// Score the dataset and write the day's predictions file
    Predict(RunDate),
    /// Evaluate the day's predictions and append a monitoring record
    Evaluate(RunDate),
    /// Print dataset shape, class balance, column statistics and correlations
    Profile,
    /// Print the monitoring summary and the top feature importances
    Summary,
}

#[derive(Debug, Args)]
struct RunDate {
    /// Run date as YYYY-MM-DD; today when omitted
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl RunDate {
    fn resolve(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("fraud_monitor={}", logging.level))
    })?;

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    init_logging(&config.logging)?;
    info!(command = ?cli.command, "Starting fraud monitor");

    match cli.command {
        Command::Train => {
            let report = Jobs::new(config).weekly_train().context("Weekly training failed")?;
            info!(
                model_id = %report.model_id,
                rows = report.rows_trained,
                auc = report.validation.auc,
                f1 = report.validation.f1_score,
                retrain_recommended = report.retrain_recommended,
                "Training finished"
            );
        }
        Command::Predict(run) => {
            let report = Jobs::new(config)
                .daily_predict(run.resolve())
                .context("Daily prediction failed")?;
            info!(
                path = %report.path.display(),
                rows = report.rows,
                flagged = report.flagged,
                "Prediction finished"
            );
        }
        Command::Evaluate(run) => {
            let outcome = Jobs::new(config)
                .daily_evaluate(run.resolve())
                .context("Daily evaluation failed")?;
            for (column, drift) in outcome.drift.iter() {
                info!(
                    column = %column,
                    drift_score = drift.drift_score,
                    drifted = drift.drifted,
                    "Column drift"
                );
            }
            if let Some(degradation) = outcome.degradation {
                info!(
                    current_auc = degradation.current_auc,
                    auc_drop = degradation.auc_drop,
                    retrain = degradation.retrain,
                    "Degradation check"
                );
            }
            info!(
                auc = outcome.record.auc,
                drift_score = outcome.record.drift_score,
                retrain_triggered = outcome.record.retrain_triggered,
                "Evaluation finished"
            );
        }
        Command::Profile => profile(&config)?,
        Command::Summary => summary(&config)?,
    }

    Ok(())
}

fn profile(config: &AppConfig) -> Result<()> {
    let records = read_transactions(&config.fraud_dataset)
        .with_context(|| format!("Failed to read {}", config.fraud_dataset.display()))?;
    DatasetProfile::of(&records).print();

    for (class, share) in class_distribution(&records, config.training.label) {
        let class = class.map(|c| c.to_string()).unwrap_or_else(|| "missing".to_string());
        info!(class = %class, percent = format!("{:.3}", share), "Class distribution");
    }

    let features = engineer_features(&records)?;
    for column in describe(&features, &TRACKED_NUMERIC_COLUMNS) {
        info!(
            column = %column.column,
            count = column.count,
            mean = column.mean,
            min = column.min,
            median = column.median,
            max = column.max,
            "Column statistics"
        );
    }

    let matrix = correlation_matrix(&features, &TRACKED_NUMERIC_COLUMNS);
    for (i, a) in matrix.columns.iter().enumerate() {
        for (j, b) in matrix.columns.iter().enumerate().skip(i + 1) {
            if let Some(r) = matrix.values[i][j] {
                if r.abs() >= 0.5 {
                    info!(a = %a, b = %b, r = format!("{:.3}", r), "Strong correlation");
                }
            }
        }
    }
    Ok(())
}

fn summary(config: &AppConfig) -> Result<()> {
    let history = read_monitoring(&config.monitoring_metrics)
        .with_context(|| format!("Failed to read {}", config.monitoring_metrics.display()))?;
    let warning = read_warning(&config.warning_file)?;

    match MonitoringSummary::from_history(&history, &config.monitor.drift_bands) {
        Some(summary) => summary.print(warning.as_deref()),
        None => warn!("Monitoring history is empty"),
    }

    match read_feature_importance(&config.shap_global) {
        Ok(rows) => {
            for row in rows.iter().take(TOP_FEATURES) {
                info!(feature = %row.feature, importance = format!("{:.4}", row.importance), "Feature importance");
            }
        }
        Err(e) => warn!(error = %e, "Feature importance unavailable"),
    }
    Ok(())
}

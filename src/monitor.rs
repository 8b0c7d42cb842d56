//! Drift and degradation monitoring.
//!
//! Two independent checks (per-column Wasserstein drift against reference
//! data, AUC drop against a baseline) plus the composite retrain policy
//! shared by the weekly training and daily evaluation jobs.

use crate::dataset::CsvTable;
use crate::error::{MonitorError, Result};
use crate::metrics::roc_auc;
use crate::stats;
use crate::types::features::{FeatureSet, NumericColumn};
use crate::types::monitoring::MonitoringRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-column drift threshold
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.1;
/// Tolerated AUC drop before the degradation check fires
pub const DEFAULT_DEGRADATION_THRESHOLD: f64 = 0.05;

/// First Wasserstein (earth mover's) distance between two 1-D samples.
///
/// Integrates the absolute difference of the empirical CDFs.
pub fn wasserstein_distance(u: &[f64], v: &[f64]) -> Result<f64> {
    if u.is_empty() || v.is_empty() {
        return Err(MonitorError::fit(
            "Wasserstein distance",
            "distribution has no observed values",
        ));
    }
    let u_sorted = stats::sorted(u);
    let v_sorted = stats::sorted(v);
    let mut all = Vec::with_capacity(u.len() + v.len());
    all.extend_from_slice(&u_sorted);
    all.extend_from_slice(&v_sorted);
    let all = stats::sorted(&all);

    let (n_u, n_v) = (u.len() as f64, v.len() as f64);
    let mut distance = 0.0;
    for pair in all.windows(2) {
        let (x, next) = (pair[0], pair[1]);
        let delta = next - x;
        if delta == 0.0 {
            continue;
        }
        let u_cdf = u_sorted.partition_point(|&value| value <= x) as f64 / n_u;
        let v_cdf = v_sorted.partition_point(|&value| value <= x) as f64 / n_v;
        distance += (u_cdf - v_cdf).abs() * delta;
    }
    Ok(distance)
}

/// Drift result for one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub drift_score: f64,
    pub drifted: bool,
}

/// Per-column drift, in the order the columns were checked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriftReport {
    entries: Vec<(NumericColumn, ColumnDrift)>,
}

impl DriftReport {
    pub fn get(&self, column: NumericColumn) -> Option<&ColumnDrift> {
        self.entries
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, drift)| drift)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NumericColumn, ColumnDrift)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Columns whose distance exceeded the threshold
    pub fn drifted_columns(&self) -> Vec<NumericColumn> {
        self.entries
            .iter()
            .filter(|(_, d)| d.drifted)
            .map(|(c, _)| *c)
            .collect()
    }

    /// Unweighted mean distance over all checked columns.
    ///
    /// Columns are not rescaled, so large-valued columns dominate.
    pub fn mean_score(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|(_, d)| d.drift_score).sum::<f64>() / self.entries.len() as f64
    }
}

/// A table that can list the observed values of an engineered column.
///
/// Missing cells are left out.
pub trait ColumnSource {
    fn observed_values(&self, column: NumericColumn) -> Result<Vec<f64>>;
}

impl ColumnSource for FeatureSet {
    fn observed_values(&self, column: NumericColumn) -> Result<Vec<f64>> {
        Ok(self.observed(column))
    }
}

impl ColumnSource for CsvTable {
    fn observed_values(&self, column: NumericColumn) -> Result<Vec<f64>> {
        self.observed(column)
    }
}

/// Compare each column's new distribution with its reference.
pub fn check_drift<N, R>(
    new_data: &N,
    reference_data: &R,
    columns: &[NumericColumn],
    threshold: f64,
) -> Result<DriftReport>
where
    N: ColumnSource + ?Sized,
    R: ColumnSource + ?Sized,
{
    let mut entries = Vec::with_capacity(columns.len());
    for &column in columns {
        let new = new_data.observed_values(column)?;
        let reference = reference_data.observed_values(column)?;
        let drift_score = wasserstein_distance(&new, &reference).map_err(|_| {
            MonitorError::fit(
                format!("drift for `{}`", column),
                "new or reference data has no observed values",
            )
        })?;
        let drifted = drift_score > threshold;
        if drifted {
            warn!(column = %column, drift_score, threshold, "Feature drift detected");
        } else {
            debug!(column = %column, drift_score, "Feature stable");
        }
        entries.push((
            column,
            ColumnDrift {
                drift_score,
                drifted,
            },
        ));
    }
    Ok(DriftReport { entries })
}

/// Outcome of the AUC degradation check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    pub current_auc: f64,
    pub auc_drop: f64,
    pub retrain: bool,
}

/// Compare the batch AUC against `baseline_auc`.
pub fn check_model_degradation(
    y_true: &[u8],
    y_proba: &[f64],
    baseline_auc: f64,
    threshold: f64,
) -> Result<DegradationReport> {
    let current_auc = roc_auc(y_true, y_proba)?;
    let auc_drop = baseline_auc - current_auc;
    Ok(DegradationReport {
        current_auc,
        auc_drop,
        retrain: auc_drop > threshold,
    })
}

/// The two numbers the retrain policy looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub auc: f64,
    pub drift_score: f64,
}

impl From<&MonitoringRecord> for MetricsSnapshot {
    fn from(record: &MonitoringRecord) -> Self {
        Self {
            auc: record.auc,
            drift_score: record.drift_score,
        }
    }
}

/// Composite retrain rule: AUC under the floor or drift over the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrainPolicy {
    #[serde(default = "default_auc_floor")]
    pub auc_floor: f64,
    #[serde(default = "default_drift_ceiling")]
    pub drift_ceiling: f64,
}

fn default_auc_floor() -> f64 {
    0.88
}

fn default_drift_ceiling() -> f64 {
    0.15
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            auc_floor: default_auc_floor(),
            drift_ceiling: default_drift_ceiling(),
        }
    }
}

impl RetrainPolicy {
    /// Both comparisons are strict; values on a bound do not trigger.
    pub fn should_retrain(&self, snapshot: MetricsSnapshot) -> bool {
        snapshot.auc < self.auc_floor || snapshot.drift_score > self.drift_ceiling
    }
}

//! Missing-value imputation with persisted fill values.
//!
//! Fill values are fitted once at training time and saved next to the
//! model, so scoring fills gaps with the training-time statistics.

use crate::dataset::StagedWrites;
use crate::error::{MonitorError, Result};
use crate::stats;
use crate::types::features::{FeatureSet, NumericColumn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Statistic used to compute each column's fill value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    #[default]
    Median,
    MostFrequent,
    Constant(f64),
}

/// Unfitted imputer
#[derive(Debug, Clone, Default)]
pub struct Imputer {
    strategy: ImputeStrategy,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self { strategy }
    }

    /// Compute one fill value per column from the observed values.
    pub fn fit(&self, set: &FeatureSet, columns: &[NumericColumn]) -> Result<FittedImputer> {
        let mut fill_values = BTreeMap::new();
        for &column in columns {
            let observed = set.observed(column);
            let value = match self.strategy {
                ImputeStrategy::Mean => stats::mean(&observed),
                ImputeStrategy::Median => stats::median(&observed),
                ImputeStrategy::MostFrequent => stats::mode(&observed),
                ImputeStrategy::Constant(value) => Some(value),
            }
            .ok_or_else(|| {
                MonitorError::fit(
                    format!("imputer for `{}`", column),
                    "column has no observed values",
                )
            })?;
            debug!(column = %column, fill_value = value, "Fitted imputation value");
            fill_values.insert(column, value);
        }

        Ok(FittedImputer {
            strategy: self.strategy,
            fill_values,
        })
    }
}

/// Imputer with fitted per-column fill values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedImputer {
    strategy: ImputeStrategy,
    fill_values: BTreeMap<NumericColumn, f64>,
}

impl FittedImputer {
    pub fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    pub fn fill_value(&self, column: NumericColumn) -> Option<f64> {
        self.fill_values.get(&column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = NumericColumn> + '_ {
        self.fill_values.keys().copied()
    }

    /// Return a copy of `set` with missing values in fitted columns filled.
    pub fn transform(&self, set: &FeatureSet) -> FeatureSet {
        let mut filled = set.clone();
        let mut count = 0usize;
        for record in &mut filled.records {
            for (&column, &value) in &self.fill_values {
                if record.value(column).is_none() {
                    record.fill(column, value);
                    count += 1;
                }
            }
        }
        debug!(cells = count, "Imputed missing values");
        filled
    }

    /// Persist as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writes = StagedWrites::new();
        self.stage(&mut writes, path)?;
        writes.commit()?;
        info!(path = %path.display(), columns = self.fill_values.len(), "Imputer saved");
        Ok(())
    }

    /// Serialize into a pending group of writes
    pub fn stage(&self, writes: &mut StagedWrites, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| MonitorError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        writes.stage(path, &json)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = crate::dataset::read_file(path)?;
        serde_json::from_slice(&bytes).map_err(|source| MonitorError::Artifact {
            path: path.to_path_buf(),
            source,
        })
    }
}

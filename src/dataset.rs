//! Flat-file storage: transactions, predictions, monitoring metrics,
//! feature importance and the retrain warning.
//!
//! Every write goes through [`write_atomic`], so a failed job never leaves a
//! half-written file behind.

use crate::error::{MonitorError, Result};
use crate::feature_engineer::require_source_columns;
use crate::types::features::{FeatureSet, NumericColumn};
use crate::types::monitoring::MonitoringRecord;
use crate::types::transaction::{parse_numeric, Transaction};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read a whole file, mapping a missing path to `MissingFile`.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(MonitorError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read(path)?)
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut writes = StagedWrites::new();
    writes.stage(path, contents)?;
    writes.commit()
}

/// A group of files replaced together.
///
/// Each payload is written and synced to a temp file beside its target.
/// Nothing is renamed into place until every payload has been staged, and
/// dropping an uncommitted group removes its temp files.
#[derive(Debug, Default)]
pub struct StagedWrites {
    staged: Vec<(tempfile::NamedTempFile, PathBuf)>,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        debug!(path = %path.display(), bytes = contents.len(), "File staged");
        self.staged.push((tmp, path.to_path_buf()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Rename every staged file over its target, in staging order.
    pub fn commit(self) -> Result<()> {
        for (tmp, path) in self.staged {
            tmp.persist(&path).map_err(|e| MonitorError::Io(e.error))?;
            debug!(path = %path.display(), "File written");
        }
        Ok(())
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> MonitorError + '_ {
    move |source| MonitorError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn open_csv(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(MonitorError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    csv::Reader::from_path(path).map_err(csv_error(path))
}

/// Load the transactions dataset, validating the required columns first.
pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let mut reader = open_csv(path)?;
    let header = reader.headers().map_err(csv_error(path))?.clone();
    require_source_columns(&header, &path.display().to_string())?;

    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<Transaction>, csv::Error>>()
        .map_err(csv_error(path))?;

    info!(path = %path.display(), rows = records.len(), "Transactions loaded");
    Ok(records)
}

/// Seeded sample without replacement; order follows the sampled indices.
///
/// Asking for at least as many rows as exist returns every row unchanged.
pub fn sample_records(records: &[Transaction], n: usize, seed: u64) -> Vec<Transaction> {
    if n >= records.len() {
        if n > records.len() {
            warn!(
                requested = n,
                available = records.len(),
                "Sample size exceeds dataset, using all rows"
            );
        }
        return records.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    index::sample(&mut rng, records.len(), n)
        .into_iter()
        .map(|i| records[i].clone())
        .collect()
}

/// Model output for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub proba: f64,
    pub label: u8,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn label_cell(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render the predictions table: source columns, engineered columns,
/// type indicators, then `pred_proba` and `pred_label`.
pub fn predictions_csv(set: &FeatureSet, predictions: &[Prediction]) -> Result<Vec<u8>> {
    if set.len() != predictions.len() {
        return Err(MonitorError::fit(
            "predictions table",
            format!("{} rows but {} predictions", set.len(), predictions.len()),
        ));
    }

    let mut writer = csv::Writer::from_writer(vec![]);
    let mut header: Vec<String> = [
        "step",
        "amount",
        "nameOrig",
        "oldbalanceOrg",
        "newbalanceOrig",
        "nameDest",
        "oldbalanceDest",
        "newbalanceDest",
        "isFraud",
        "isFlaggedFraud",
        "balance_diff_orig",
        "balance_diff_dest",
        "error_balance_orig",
        "error_balance_dest",
        "amount_to_balance_ratio",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(set.vocabulary.column_names());
    header.push("pred_proba".to_string());
    header.push("pred_label".to_string());
    writer
        .write_record(&header)
        .map_err(|e| MonitorError::Io(e.into()))?;

    for (record, prediction) in set.records.iter().zip(predictions) {
        let tx = &record.source;
        let mut row = vec![
            cell(tx.step),
            cell(tx.amount),
            tx.name_orig.clone(),
            cell(tx.old_balance_orig),
            cell(tx.new_balance_orig),
            tx.name_dest.clone(),
            cell(tx.old_balance_dest),
            cell(tx.new_balance_dest),
            label_cell(tx.is_fraud),
            label_cell(tx.is_flagged_fraud),
            cell(record.balance_diff_orig),
            cell(record.balance_diff_dest),
            record.error_balance_orig.to_string(),
            record.error_balance_dest.to_string(),
            cell(record.amount_to_balance_ratio),
        ];
        row.extend(record.type_indicators.iter().map(|f| f.to_string()));
        row.push(prediction.proba.to_string());
        row.push(prediction.label.to_string());
        writer
            .write_record(&row)
            .map_err(|e| MonitorError::Io(e.into()))?;
    }

    writer
        .into_inner()
        .map_err(|e| MonitorError::Io(e.into_error()))
}

/// Path of the predictions file for a date
pub fn predictions_path(dir: &Path, date: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("predictions_{}.csv", date.format("%Y-%m-%d")))
}

/// A CSV loaded as raw string records with column lookup by name.
#[derive(Debug, Clone)]
pub struct CsvTable {
    origin: String,
    columns: HashMap<String, usize>,
    rows: Vec<csv::StringRecord>,
}

impl CsvTable {
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = open_csv(path)?;
        let header = reader.headers().map_err(csv_error(path))?.clone();
        let columns = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, csv::Error>>()
            .map_err(csv_error(path))?;
        Ok(Self {
            origin: path.display().to_string(),
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn index(&self, column: &str) -> Result<usize> {
        self.columns
            .get(column)
            .copied()
            .ok_or_else(|| MonitorError::missing_column(column, self.origin.clone()))
    }

    /// Parse a numeric column; empty cells and NA tokens become `None`.
    pub fn numeric(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let idx = self.index(column)?;
        self.rows
            .iter()
            .map(|row| {
                let raw = row.get(idx).unwrap_or("");
                parse_numeric(raw).map_err(|_| MonitorError::InvalidValue {
                    column: column.to_string(),
                    value: raw.trim().to_string(),
                })
            })
            .collect()
    }

    /// Parse a 0/1 column where every cell must be present.
    pub fn binary(&self, column: &str) -> Result<Vec<u8>> {
        self.numeric(column)?
            .into_iter()
            .map(|value| match value {
                Some(v) if v == 0.0 => Ok(0),
                Some(v) if v == 1.0 => Ok(1),
                other => Err(MonitorError::InvalidValue {
                    column: column.to_string(),
                    value: other.map(|v| v.to_string()).unwrap_or_default(),
                }),
            })
            .collect()
    }

    /// Observed values of an engineered numeric column
    pub fn observed(&self, column: NumericColumn) -> Result<Vec<f64>> {
        Ok(self.numeric(column.name())?.into_iter().flatten().collect())
    }
}

/// Load the monitoring history in file order.
pub fn read_monitoring(path: &Path) -> Result<Vec<MonitoringRecord>> {
    let mut reader = open_csv(path)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<MonitoringRecord>, csv::Error>>()
        .map_err(csv_error(path))
}

/// The last monitoring record, treated as the current baseline.
pub fn latest_monitoring(path: &Path) -> Result<MonitoringRecord> {
    read_monitoring(path)?
        .pop()
        .ok_or_else(|| MonitorError::EmptyDataset {
            path: path.to_path_buf(),
        })
}

/// Append one record, rewriting the file atomically.
///
/// A missing file is created with a header.
pub fn append_monitoring(path: &Path, record: &MonitoringRecord) -> Result<()> {
    let mut history = if path.exists() {
        read_monitoring(path)?
    } else {
        Vec::new()
    };
    history.push(record.clone());

    let mut writer = csv::Writer::from_writer(vec![]);
    for row in &history {
        writer.serialize(row).map_err(csv_error(path))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| MonitorError::Io(e.into_error()))?;
    write_atomic(path, &bytes)?;

    info!(
        path = %path.display(),
        date = %record.date,
        rows = history.len(),
        "Monitoring record appended"
    );
    Ok(())
}

/// One row of the global feature-importance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Load feature importances, most important first.
pub fn read_feature_importance(path: &Path) -> Result<Vec<FeatureImportance>> {
    let mut reader = open_csv(path)?;
    let mut rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<FeatureImportance>, csv::Error>>()
        .map_err(csv_error(path))?;
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    Ok(rows)
}

/// Render feature importances as a two-column `feature,importance` table.
pub fn feature_importance_csv(rows: &[FeatureImportance]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| MonitorError::Io(e.into()))?;
    }
    writer
        .into_inner()
        .map_err(|e| MonitorError::Io(e.into_error()))
}

/// Text shown by the dashboard when retraining is recommended.
pub const RETRAIN_WARNING: &str =
    "Retraining recommended: drift or low model performance detected.";

/// Contents of the warning file; empty when no warning applies.
pub fn warning_text(retrain: bool) -> &'static str {
    if retrain {
        RETRAIN_WARNING
    } else {
        ""
    }
}


/// Current warning, `None` when the file is absent or blank.
pub fn read_warning(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineer::engineer_features;
    use chrono::NaiveDate;

    const HEADER: &str = "step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrig,nameDest,oldbalanceDest,newbalanceDest,isFraud,isFlaggedFraud\n";

    fn record(day: u32, auc: f64) -> MonitoringRecord {
        MonitoringRecord {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            auc,
            precision: 0.8,
            recall: 0.7,
            f1_score: 0.75,
            drift_score: 0.05,
            retrain_triggered: false,
        }
    }

    #[test]
    fn test_read_transactions_validates_header() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        std::fs::write(
            &good,
            format!("{}1,PAYMENT,10.0,C1,100.0,90.0,M1,0.0,0.0,0,0\n", HEADER),
        )
        .unwrap();
        assert_eq!(read_transactions(&good).unwrap().len(), 1);

        let bad = dir.path().join("bad.csv");
        std::fs::write(&bad, "step,type,amount\n1,PAYMENT,10.0\n").unwrap();
        let err = read_transactions(&bad).unwrap_err();
        assert!(matches!(err, MonitorError::MissingColumn { .. }));

        let missing = dir.path().join("none.csv");
        assert_eq!(
            read_transactions(&missing).unwrap_err().kind(),
            crate::error::ErrorKind::MissingFile
        );
    }

    #[test]
    fn test_nan_cells_are_imputed_like_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.csv");
        std::fs::write(
            &path,
            format!(
                "{}1,PAYMENT,NaN,C1,100.0,90.0,M1,0.0,0.0,0,0\n\
                 1,PAYMENT,10,C2,100.0,90.0,M2,0.0,0.0,0,0\n\
                 1,PAYMENT,20,C3,100.0,90.0,M3,0.0,0.0,0,0\n",
                HEADER
            ),
        )
        .unwrap();

        let records = read_transactions(&path).unwrap();
        assert_eq!(records[0].amount, None);

        let set = engineer_features(&records).unwrap();
        let imputer = crate::imputer::Imputer::default()
            .fit(&set, &[NumericColumn::Amount])
            .unwrap();
        assert_eq!(imputer.fill_value(NumericColumn::Amount), Some(15.0));
        let filled = imputer.transform(&set);
        assert_eq!(filled.records[0].source.amount, Some(15.0));
    }

    #[test]
    fn test_table_numeric_reads_na_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "amount\n1.5\nNA\nnan\n#N/A\n2\n").unwrap();
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(
            table.numeric("amount").unwrap(),
            vec![Some(1.5), None, None, None, Some(2.0)]
        );

        std::fs::write(&path, "amount\nabc\n").unwrap();
        let table = CsvTable::read(&path).unwrap();
        assert!(matches!(
            table.numeric("amount").unwrap_err(),
            MonitorError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_append_keeps_history_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.csv");

        append_monitoring(&path, &record(1, 0.91)).unwrap();
        append_monitoring(&path, &record(2, 0.89)).unwrap();

        let history = read_monitoring(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(latest_monitoring(&path).unwrap().auc, 0.89);
    }

    #[test]
    fn test_latest_on_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.csv");
        std::fs::write(
            &path,
            "date,auc,precision,recall,f1_score,drift_score,retrain_triggered\n",
        )
        .unwrap();
        let err = latest_monitoring(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::EmptyDataset);
    }

    #[test]
    fn test_sample_records() {
        let records: Vec<Transaction> = (0..20)
            .map(|i| Transaction::new("PAYMENT", i as f64))
            .collect();
        let a = sample_records(&records, 5, 42);
        let b = sample_records(&records, 5, 42);
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        assert_eq!(sample_records(&records, 50, 42).len(), 20);
    }

    #[test]
    fn test_predictions_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut tx = Transaction::new("TRANSFER", 50.0).with_origin(50.0, 0.0);
        tx.step = None;
        let set = engineer_features(&[tx, Transaction::new("PAYMENT", 5.0)]).unwrap();
        let predictions = [
            Prediction { proba: 0.9, label: 1 },
            Prediction { proba: 0.1, label: 0 },
        ];
        let bytes = predictions_csv(&set, &predictions).unwrap();
        let path = predictions_path(dir.path(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        write_atomic(&path, &bytes).unwrap();
        assert!(path.ends_with("predictions_2024-06-03.csv"));

        let table = CsvTable::read(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric("step").unwrap(), vec![None, Some(1.0)]);
        assert_eq!(table.binary("pred_label").unwrap(), vec![1, 0]);
        assert_eq!(table.numeric("type_TRANSFER").unwrap(), vec![Some(1.0), Some(0.0)]);
        assert_eq!(
            table.observed(NumericColumn::BalanceDiffOrig).unwrap(),
            vec![50.0, 0.0]
        );
        assert!(table.numeric("type").is_err());
    }

    #[test]
    fn test_staged_writes_land_together() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a/first.txt");
        let second = dir.path().join("second.txt");
        std::fs::write(&second, "old").unwrap();

        let mut writes = StagedWrites::new();
        writes.stage(&first, b"one").unwrap();
        writes.stage(&second, b"two").unwrap();
        assert_eq!(writes.len(), 2);
        assert!(!first.exists());
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "old");

        writes.commit().unwrap();
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "two");
    }

    #[test]
    fn test_dropped_stage_leaves_targets_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model.json");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut writes = StagedWrites::new();
        writes.stage(&target, b"new").unwrap();
        assert!(writes.stage(&blocker.join("shap.csv"), b"x").is_err());
        drop(writes);

        assert!(!target.exists());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_warning_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warning.txt");
        assert_eq!(read_warning(&path).unwrap(), None);

        write_atomic(&path, warning_text(true).as_bytes()).unwrap();
        assert_eq!(read_warning(&path).unwrap().as_deref(), Some(RETRAIN_WARNING));

        write_atomic(&path, warning_text(false).as_bytes()).unwrap();
        assert_eq!(read_warning(&path).unwrap(), None);
    }

    #[test]
    fn test_feature_importance_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shap.csv");
        let rows = [("amount", 0.2), ("step", 0.05), ("balance_diff_orig", 0.4)]
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.to_string(),
                importance,
            });
        let bytes = feature_importance_csv(&rows).unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("feature,importance\n"));
        write_atomic(&path, &bytes).unwrap();
        let rows = read_feature_importance(&path).unwrap();
        assert_eq!(rows[0].feature, "balance_diff_orig");
        assert_eq!(rows[2].feature, "step");
    }
}

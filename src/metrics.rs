//! Classification metrics and the monitoring history summary.

use crate::error::{MonitorError, Result};
use crate::types::monitoring::{DriftBands, DriftLevel, MonitoringRecord};
use std::cmp::Ordering;
use tracing::info;

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank. Fails unless both classes are present.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Result<f64> {
    if y_true.len() != scores.len() {
        return Err(MonitorError::fit(
            "ROC AUC",
            format!("{} labels with {} scores", y_true.len(), scores.len()),
        ));
    }
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(MonitorError::fit(
            "ROC AUC",
            "only one class present in y_true",
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let score = scores[order[start]];
        let end = start + order[start..].iter().take_while(|&&i| scores[i] == score).count();
        // Ranks are 1-based; the tie group spans start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| y_true[i] == 1).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let n_pos = positives as f64;
    let n_neg = negatives as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Confusion matrix counts for the fraud class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionCounts {
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut counts = Self::default();
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            match (truth, pred) {
                (1, 1) => counts.true_positive += 1,
                (0, 1) => counts.false_positive += 1,
                (1, _) => counts.false_negative += 1,
                _ => counts.true_negative += 1,
            }
        }
        counts
    }

    /// 0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// 0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1_score(&self) -> f64 {
        ratio(
            2 * self.true_positive,
            2 * self.true_positive + self.false_positive + self.false_negative,
        )
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Metrics for one scored batch
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub auc: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ClassificationReport {
    pub fn compute(y_true: &[u8], y_proba: &[f64], y_pred: &[u8]) -> Result<Self> {
        if y_pred.len() != y_true.len() {
            return Err(MonitorError::fit(
                "classification report",
                format!("{} labels with {} predictions", y_true.len(), y_pred.len()),
            ));
        }
        let counts = ConfusionCounts::from_labels(y_true, y_pred);
        Ok(Self {
            auc: roc_auc(y_true, y_proba)?,
            precision: counts.precision(),
            recall: counts.recall(),
            f1_score: counts.f1_score(),
            support: y_true.len(),
        })
    }
}

/// Aggregate view of the monitoring history
#[derive(Debug, Clone)]
pub struct MonitoringSummary {
    pub latest: MonitoringRecord,
    pub evaluations: usize,
    pub retrains_triggered: usize,
    pub mean_auc: f64,
    pub min_auc: f64,
    pub mean_drift: f64,
    pub max_drift: f64,
    pub drift_level: DriftLevel,
}

impl MonitoringSummary {
    /// Summarize a non-empty history; the last record is the latest.
    pub fn from_history(history: &[MonitoringRecord], bands: &DriftBands) -> Option<Self> {
        let latest = history.last()?.clone();
        let n = history.len() as f64;
        Some(Self {
            evaluations: history.len(),
            retrains_triggered: history.iter().filter(|r| r.retrain_triggered).count(),
            mean_auc: history.iter().map(|r| r.auc).sum::<f64>() / n,
            min_auc: history.iter().map(|r| r.auc).fold(f64::INFINITY, f64::min),
            mean_drift: history.iter().map(|r| r.drift_score).sum::<f64>() / n,
            max_drift: history.iter().map(|r| r.drift_score).fold(0.0, f64::max),
            drift_level: latest.drift_level(bands),
            latest,
        })
    }

    /// Print summary statistics
    pub fn print(&self, warning: Option<&str>) {
        let latest = &self.latest;
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              FRAUD MODEL MONITORING - SUMMARY                ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        if let Some(text) = warning {
            info!("║ WARNING: {}", text);
            info!("╠══════════════════════════════════════════════════════════════╣");
        }
        info!("║ Latest evaluation: {}", latest.date);
        info!(
            "║   AUC={:.3} precision={:.3} recall={:.3} f1={:.3}",
            latest.auc, latest.precision, latest.recall, latest.f1_score
        );
        info!(
            "║   drift={:.3} ({:?}) retrain={}",
            latest.drift_score,
            self.drift_level,
            if latest.retrain_triggered { "yes" } else { "no" }
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Evaluations: {:>5}  │  Retrains triggered: {:>5}",
            self.evaluations, self.retrains_triggered
        );
        info!(
            "║ AUC mean={:.3} min={:.3}  │  Drift mean={:.3} max={:.3}",
            self.mean_auc, self.min_auc, self.mean_drift, self.max_drift
        );
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let y = [0, 1];
        assert_eq!(roc_auc(&y, &[0.5, 0.5]).unwrap(), 0.5);

        let y = [0, 0, 1, 1];
        // One positive ties with one negative: 3.5 of 4 pairs ordered
        assert_eq!(roc_auc(&y, &[0.1, 0.4, 0.4, 0.9]).unwrap(), 0.875);
    }

    #[test]
    fn test_auc_single_class_fails() {
        assert!(roc_auc(&[1, 1], &[0.2, 0.3]).is_err());
    }

    #[test]
    fn test_confusion_metrics() {
        let y_true = [1, 1, 0, 0, 1];
        let y_pred = [1, 0, 1, 0, 1];
        let counts = ConfusionCounts::from_labels(&y_true, &y_pred);
        assert_eq!(counts.true_positive, 2);
        assert_eq!(counts.false_positive, 1);
        assert_eq!(counts.false_negative, 1);
        assert!((counts.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((counts.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((counts.f1_score() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let counts = ConfusionCounts::from_labels(&[0, 1], &[0, 0]);
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.f1_score(), 0.0);
    }

    #[test]
    fn test_summary() {
        let record = |day, auc, drift, retrain| MonitoringRecord {
            date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
            auc,
            precision: 0.5,
            recall: 0.5,
            f1_score: 0.5,
            drift_score: drift,
            retrain_triggered: retrain,
        };
        let history = vec![record(1, 0.92, 0.05, false), record(2, 0.86, 0.2, true)];
        let summary = MonitoringSummary::from_history(&history, &DriftBands::default()).unwrap();

        assert_eq!(summary.evaluations, 2);
        assert_eq!(summary.retrains_triggered, 1);
        assert_eq!(summary.min_auc, 0.86);
        assert_eq!(summary.max_drift, 0.2);
        assert_eq!(summary.drift_level, DriftLevel::High);
        assert!(MonitoringSummary::from_history(&[], &DriftBands::default()).is_none());
        summary.print(Some("check"));
    }
}

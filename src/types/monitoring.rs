//! Monitoring records appended by the daily evaluation job

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Drift severity shown next to the drift score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftLevel {
    /// Distribution stable
    Low,
    /// Worth watching
    Moderate,
    /// Retraining likely needed
    High,
}

impl DriftLevel {
    /// Classify a mean drift score; a score equal to a band bound stays in that band
    pub fn from_score(score: f64, bands: &DriftBands) -> Self {
        if score > bands.moderate {
            DriftLevel::High
        } else if score > bands.low {
            DriftLevel::Moderate
        } else {
            DriftLevel::Low
        }
    }
}

/// Upper bounds of the low and moderate drift bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftBands {
    pub low: f64,
    pub moderate: f64,
}

impl Default for DriftBands {
    fn default() -> Self {
        Self {
            low: 0.10,
            moderate: 0.15,
        }
    }
}

/// One row of the monitoring-metrics CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    /// Evaluation date
    pub date: NaiveDate,

    /// ROC AUC on the day's scored batch
    pub auc: f64,

    pub precision: f64,

    pub recall: f64,

    pub f1_score: f64,

    /// Mean Wasserstein distance over the tracked columns
    pub drift_score: f64,

    /// Whether the retrain policy fired; stored as 0/1
    #[serde(with = "flag")]
    pub retrain_triggered: bool,
}

impl MonitoringRecord {
    pub fn drift_level(&self, bands: &DriftBands) -> DriftLevel {
        DriftLevel::from_score(self.drift_score, bands)
    }
}

/// Integer-coded boolean that also accepts `true`/`false` on input.
mod flag {
    use super::*;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" => Ok(true),
            "0" | "0.0" | "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid retrain flag `{}`",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_level_from_score() {
        let bands = DriftBands::default();

        assert_eq!(DriftLevel::from_score(0.05, &bands), DriftLevel::Low);
        assert_eq!(DriftLevel::from_score(0.10, &bands), DriftLevel::Low);
        assert_eq!(DriftLevel::from_score(0.12, &bands), DriftLevel::Moderate);
        assert_eq!(DriftLevel::from_score(0.15, &bands), DriftLevel::Moderate);
        assert_eq!(DriftLevel::from_score(0.30, &bands), DriftLevel::High);
    }

    #[test]
    fn test_csv_flag_encoding() {
        let data = "date,auc,precision,recall,f1_score,drift_score,retrain_triggered\n\
                    2024-05-01,0.91,0.8,0.7,0.75,0.08,0\n\
                    2024-05-02,0.86,0.7,0.6,0.65,0.17,true\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let records: Vec<MonitoringRecord> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert!(!records[0].retrain_triggered);
        assert!(records[1].retrain_triggered);
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());

        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&records[1]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.lines().nth(1).unwrap().ends_with(",1"));
    }
}

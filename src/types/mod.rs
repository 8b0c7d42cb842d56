//! Type definitions for the fraud monitor

pub mod features;
pub mod monitoring;
pub mod transaction;

pub use features::{
    EngineeredRecord, FeatureSet, LabelColumn, NumericColumn, TypeVocabulary, UnseenTypePolicy,
    REQUIRED_SOURCE_COLUMNS, TRACKED_NUMERIC_COLUMNS,
};
pub use monitoring::{DriftBands, DriftLevel, MonitoringRecord};
pub use transaction::Transaction;

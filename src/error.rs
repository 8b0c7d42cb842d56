//! Error types for the fraud monitoring library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Coarse error categories surfaced to job callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingFile,
    MalformedData,
    EmptyDataset,
    Fit,
    Config,
}

/// Errors raised while loading data, fitting preprocessors, or running jobs.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A referenced input path does not exist
    #[error("file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// CSV could not be read or parsed
    #[error("malformed CSV in {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from a table
    #[error("required column `{column}` missing from {origin}")]
    MissingColumn { column: String, origin: String },

    /// A cell could not be interpreted
    #[error("invalid value `{value}` in column `{column}`")]
    InvalidValue { column: String, value: String },

    /// A transaction type outside the training vocabulary
    #[error("transaction type `{0}` was not seen at training time")]
    UnseenCategory(String),

    /// Model or imputer artifact could not be (de)serialized
    #[error("invalid artifact {}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A table that must have rows has none
    #[error("{} has no rows", path.display())]
    EmptyDataset { path: PathBuf },

    /// A statistic or model could not be computed
    #[error("cannot fit {what}: {reason}")]
    Fit { what: String, reason: String },

    /// Configuration rejected by validation
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    pub fn fit(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fit {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>, origin: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            origin: origin.into(),
        }
    }

    /// Map the error onto the taxonomy used by job callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFile { .. } => ErrorKind::MissingFile,
            Self::Csv { .. }
            | Self::MissingColumn { .. }
            | Self::InvalidValue { .. }
            | Self::UnseenCategory(_)
            | Self::Artifact { .. }
            | Self::Io(_) => ErrorKind::MalformedData,
            Self::EmptyDataset { .. } => ErrorKind::EmptyDataset,
            Self::Fit { .. } => ErrorKind::Fit,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_mapping() {
        let missing = MonitorError::MissingFile {
            path: PathBuf::from("data/none.csv"),
        };
        assert_eq!(missing.kind(), ErrorKind::MissingFile);
        assert_eq!(
            MonitorError::missing_column("amount", "transactions.csv").kind(),
            ErrorKind::MalformedData
        );
        assert_eq!(MonitorError::fit("imputer", "all missing").kind(), ErrorKind::Fit);
    }

    #[test]
    fn test_csv_error_keeps_source() {
        let source = csv::Reader::from_reader("a,b\n1".as_bytes())
            .records()
            .find_map(|r| r.err())
            .expect("uneven row should fail");
        let err = MonitorError::Csv {
            path: PathBuf::from("x.csv"),
            source,
        };
        assert!(err.source().is_some());
        assert_eq!(err.kind(), ErrorKind::MalformedData);
    }
}

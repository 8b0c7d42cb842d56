//! Classifier, training and scoring components

pub mod artifact;
pub mod forest;
pub mod inference;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use forest::{Classifier, ForestParams, RandomForest};
pub use inference::{InferenceEngine, ScoredBatch};
pub use trainer::{Trainer, TrainingOutcome};

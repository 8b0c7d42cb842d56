//! Random forest classifier for the binary fraud label.
//!
//! Members are smartcore CART trees (Gini impurity), each fitted on a
//! bootstrap sample of the rows restricted to a random subset of
//! `sqrt(n_features)` columns. smartcore trees only return class labels, so
//! the fraud probability is the share of members voting fraud. Importances
//! are permutation importances over the training rows.

use crate::error::{MonitorError, Result};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::fmt;
use tracing::debug;

/// Decision threshold on the fraud probability.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Rows used to measure permutation importance
const IMPORTANCE_ROWS: usize = 5_000;

/// Binary classifier over dense feature rows.
pub trait Classifier {
    /// Fraud probability per row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Hard labels; a probability of exactly 0.5 is legitimate.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(rows)?
            .into_iter()
            .map(|p| u8::from(p > DECISION_THRESHOLD))
            .collect())
    }
}

/// Forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> usize {
    10
}

fn default_min_samples_split() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            seed: default_seed(),
        }
    }
}

impl ForestParams {
    fn tree_parameters(&self) -> DecisionTreeClassifierParameters {
        DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_max_depth(u16::try_from(self.max_depth).unwrap_or(u16::MAX))
            .with_min_samples_split(self.min_samples_split)
    }
}

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Copy `rows` restricted to `features` into a smartcore matrix.
fn project<'a, I>(rows: I, features: &[usize]) -> DenseMatrix<f64>
where
    I: IntoIterator<Item = &'a Vec<f64>>,
{
    let data: Vec<Vec<f64>> = rows
        .into_iter()
        .map(|row| features.iter().map(|&f| row[f]).collect())
        .collect();
    DenseMatrix::from_2d_vec(&data)
}

fn tree_error(e: smartcore::error::Failed) -> MonitorError {
    MonitorError::fit("decision tree", e.to_string())
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Member {
    /// The bootstrap sample held a single class
    Constant { label: u8 },
    Tree { features: Vec<usize>, tree: Tree },
}

impl Member {
    fn uses(&self, feature: usize) -> bool {
        match self {
            Self::Constant { .. } => false,
            Self::Tree { features, .. } => features.contains(&feature),
        }
    }

    /// One 0/1 vote per row; `rows` must be non-empty.
    fn votes(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        match self {
            Self::Constant { label } => Ok(vec![*label; rows.len()]),
            Self::Tree { features, tree } => Ok(tree
                .predict(&project(rows, features))
                .map_err(tree_error)?
                .into_iter()
                .map(|class| u8::from(class == 1))
                .collect()),
        }
    }
}

/// Bagged ensemble of smartcore decision trees
#[derive(Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    members: Vec<Member>,
    feature_importances: Vec<f64>,
}

impl fmt::Debug for RandomForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomForest")
            .field("params", &self.params)
            .field("n_features", &self.n_features)
            .field("members", &self.members.len())
            .field("feature_importances", &self.feature_importances)
            .finish()
    }
}

impl RandomForest {
    /// Fit on rows `x` with binary labels `y`. Both classes must be present.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(MonitorError::fit(
                "random forest",
                format!("{} rows with {} labels", x.len(), y.len()),
            ));
        }
        if params.n_estimators == 0 {
            return Err(MonitorError::fit("random forest", "n_estimators must be positive"));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(MonitorError::fit("random forest", "rows must share a non-zero width"));
        }
        if y.iter().any(|&label| label > 1) {
            return Err(MonitorError::fit("random forest", "labels must be 0 or 1"));
        }
        let positives = y.iter().filter(|&&label| label == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(MonitorError::fit(
                "random forest",
                "training data contains a single class",
            ));
        }

        let max_features = ((n_features as f64).sqrt() as usize).clamp(1, n_features);
        let tree_params = params.tree_parameters();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut members = Vec::with_capacity(params.n_estimators);

        for tree_idx in 0..params.n_estimators {
            let bootstrap: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            let mut features = index::sample(&mut rng, n_features, max_features).into_vec();
            features.sort_unstable();

            let labels: Vec<u32> = bootstrap.iter().map(|&i| u32::from(y[i])).collect();
            let member = if labels.iter().all(|&label| label == labels[0]) {
                Member::Constant {
                    label: u8::from(labels[0] == 1),
                }
            } else {
                let matrix = project(bootstrap.iter().map(|&i| &x[i]), &features);
                let tree = Tree::fit(&matrix, &labels, tree_params.clone()).map_err(tree_error)?;
                Member::Tree { features, tree }
            };
            debug!(tree = tree_idx, "Tree fitted");
            members.push(member);
        }

        let mut forest = Self {
            params: params.clone(),
            n_features,
            members,
            feature_importances: vec![0.0; n_features],
        };
        forest.feature_importances = forest.permutation_importances(x, y, &mut rng)?;
        Ok(forest)
    }

    /// Increase in squared probability error when one column is shuffled,
    /// normalized to sum to 1.
    fn permutation_importances(
        &self,
        x: &[Vec<f64>],
        y: &[u8],
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let picked: Vec<usize> = if x.len() > IMPORTANCE_ROWS {
            index::sample(rng, x.len(), IMPORTANCE_ROWS).into_vec()
        } else {
            (0..x.len()).collect()
        };
        let rows: Vec<Vec<f64>> = picked.iter().map(|&i| x[i].clone()).collect();
        let targets: Vec<f64> = picked.iter().map(|&i| f64::from(y[i])).collect();

        let votes = self
            .members
            .iter()
            .map(|member| member.votes(&rows))
            .collect::<Result<Vec<_>>>()?;
        let baseline = squared_error(votes.iter().map(Vec::as_slice), &targets);

        let mut importances = vec![0.0; self.n_features];
        for (feature, importance) in importances.iter_mut().enumerate() {
            let mut column: Vec<f64> = rows.iter().map(|row| row[feature]).collect();
            column.shuffle(rng);
            let shuffled: Vec<Vec<f64>> = rows
                .iter()
                .zip(column)
                .map(|(row, value)| {
                    let mut row = row.clone();
                    row[feature] = value;
                    row
                })
                .collect();

            let mut replaced = Vec::with_capacity(self.members.len());
            for member in &self.members {
                replaced.push(if member.uses(feature) {
                    Some(member.votes(&shuffled)?)
                } else {
                    None
                });
            }
            let permuted = squared_error(
                votes
                    .iter()
                    .zip(&replaced)
                    .map(|(original, changed)| changed.as_deref().unwrap_or(original.as_slice())),
                &targets,
            );
            *importance = (permuted - baseline).max(0.0);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        debug!(rows = rows.len(), baseline, "Permutation importances measured");
        Ok(importances)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Permutation importances in column order, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Mean squared gap between the vote share and the 0/1 target.
fn squared_error<'a, I>(votes: I, targets: &[f64]) -> f64
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut counts = vec![0usize; targets.len()];
    let mut members = 0usize;
    for member_votes in votes {
        members += 1;
        for (count, &vote) in counts.iter_mut().zip(member_votes) {
            *count += usize::from(vote);
        }
    }
    if members == 0 || targets.is_empty() {
        return 0.0;
    }
    counts
        .iter()
        .zip(targets)
        .map(|(&count, &target)| {
            let gap = count as f64 / members as f64 - target;
            gap * gap
        })
        .sum::<f64>()
        / targets.len() as f64
}

impl Classifier for RandomForest {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if let Some(row) = rows.iter().find(|row| row.len() != self.n_features) {
            return Err(MonitorError::InvalidValue {
                column: "feature row".to_string(),
                value: format!("{} columns, expected {}", row.len(), self.n_features),
            });
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut counts = vec![0usize; rows.len()];
        for member in &self.members {
            for (count, vote) in counts.iter_mut().zip(member.votes(rows)?) {
                *count += usize::from(vote);
            }
        }
        let members = self.members.len() as f64;
        Ok(counts.into_iter().map(|count| count as f64 / members).collect())
    }
}

//! Model snapshots and the persistence collaborator contract.
//!
//! The core exposes tree structure, ensemble weights and the
//! hyperparameters needed to reconstruct an ensemble producing
//! bit-for-bit identical scores; the concrete encoding belongs to the
//! collaborator. A JSON-backed reference store ships for checkpointing
//! and tests.

use crate::config::BoostingParams;
use crate::core::{Label, Result};
use crate::ensemble::Ensemble;
use crate::tree::RegressionTree;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

/// Hyperparameters a snapshot carries for resume compatibility checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Maximum tree count of the run that produced the snapshot.
    pub n_trees: usize,
    /// Shrinkage of the producing run.
    pub shrinkage: f64,
    /// Leaf cap of the producing run.
    pub n_leaves: usize,
    /// Minimum leaf support of the producing run.
    pub min_leaf_support: usize,
    /// Threshold cap of the producing run.
    pub n_thresholds: usize,
    /// Early stopping patience of the producing run.
    pub early_stopping_rounds: usize,
}

impl SnapshotInfo {
    /// Captures the resume-relevant hyperparameters of a configuration.
    pub fn from_params(params: &BoostingParams) -> Self {
        SnapshotInfo {
            n_trees: params.n_trees,
            shrinkage: params.shrinkage,
            n_leaves: params.tree.n_leaves,
            min_leaf_support: params.tree.min_leaf_support,
            n_thresholds: params.tree.n_thresholds,
            early_stopping_rounds: params.early_stopping_rounds,
        }
    }

    /// Whether a run configured with `params` may resume from this
    /// snapshot.
    pub fn matches(&self, params: &BoostingParams) -> bool {
        (self.shrinkage - params.shrinkage).abs() <= 1e-6
            && self.n_trees == params.n_trees
            && self.n_leaves == params.tree.n_leaves
            && self.min_leaf_support == params.tree.min_leaf_support
            && self.n_thresholds == params.tree.n_thresholds
            && self.early_stopping_rounds == params.early_stopping_rounds
    }
}

/// Complete serializable state of a trained or in-progress ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSnapshot {
    /// Producing configuration, for compatibility validation.
    pub info: SnapshotInfo,
    /// Member trees in ensemble order.
    pub trees: Vec<RegressionTree>,
    /// Member weights in ensemble order.
    pub weights: Vec<f64>,
    /// Member tags in ensemble order.
    pub labels: Vec<Label>,
}

/// Captures the current ensemble state for persistence.
pub fn snapshot(params: &BoostingParams, ensemble: &Ensemble) -> EnsembleSnapshot {
    let mut trees = Vec::with_capacity(ensemble.len());
    let mut weights = Vec::with_capacity(ensemble.len());
    let mut labels = Vec::with_capacity(ensemble.len());
    for t in 0..ensemble.len() {
        let entry = ensemble.entry(t);
        trees.push(entry.tree().clone());
        weights.push(entry.weight());
        labels.push(entry.label());
    }
    EnsembleSnapshot {
        info: SnapshotInfo::from_params(params),
        trees,
        weights,
        labels,
    }
}

/// Persistence collaborator consumed by checkpointing and resume.
pub trait SnapshotStore {
    /// Persists a snapshot. Checkpointing treats failures as non-fatal.
    fn save(&self, snapshot: &EnsembleSnapshot) -> Result<()>;

    /// Loads the most recently persisted snapshot.
    fn load(&self) -> Result<EnsembleSnapshot>;
}

/// Reference store writing one JSON document to a fixed path.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Creates a store over the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSnapshotStore { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, snapshot: &EnsembleSnapshot) -> Result<()> {
        let file = File::create(&self.path)?;
        serde_json::to_writer(BufWriter::new(file), snapshot)?;
        Ok(())
    }

    fn load(&self) -> Result<EnsembleSnapshot> {
        let file = File::open(&self.path)?;
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(snapshot)
    }
}

//! Weighted tree ensemble with stack-like rollback and incremental
//! scoring support.
//!
//! The ensemble is an ordered, fixed-capacity sequence of (tree, weight,
//! label) entries. Boosting appends at the end and rolls back by popping;
//! dropout and pruning override weights temporarily or permanently;
//! `compact` removes zero-weight entries while preserving survivor order.
//! All score maintenance is exposed as paired add/subtract updates so the
//! caller's running score arrays stay consistent with ensemble changes.

use crate::core::{Label, RankForestError, Result, Score};
use crate::dataset::Dataset;
use crate::tree::RegressionTree;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of an incremental score update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreUpdate {
    /// Add the trees' weighted contributions.
    Add,
    /// Subtract the trees' weighted contributions.
    Subtract,
}

/// One ensemble member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    tree: RegressionTree,
    /// Weight used for scoring; may be a temporary override.
    weight: f64,
    /// Last permanently committed weight, the one a snapshot persists.
    saved_weight: f64,
    /// Caller-defined tag carried alongside the tree.
    label: Label,
}

impl TreeEntry {
    /// The member's tree.
    pub fn tree(&self) -> &RegressionTree {
        &self.tree
    }

    /// The member's current scoring weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// The member's last permanently committed weight.
    pub fn saved_weight(&self) -> f64 {
        self.saved_weight
    }

    /// The member's tag.
    pub fn label(&self) -> Label {
        self.label
    }
}

/// Ordered, weighted, fixed-capacity collection of regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ensemble {
    entries: Vec<TreeEntry>,
    capacity: usize,
}

impl Ensemble {
    /// Creates an empty ensemble with capacity reserved for the
    /// configured maximum tree count.
    pub fn with_capacity(capacity: usize) -> Self {
        Ensemble {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the ensemble holds no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reserved capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The member at `index`.
    pub fn entry(&self, index: usize) -> &TreeEntry {
        &self.entries[index]
    }

    /// Appends a tree at the next capacity slot.
    pub fn push(&mut self, tree: RegressionTree, weight: f64, label: Label) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(RankForestError::ensemble(format!(
                "ensemble capacity {} exhausted",
                self.capacity
            )));
        }
        self.entries.push(TreeEntry {
            tree,
            weight,
            saved_weight: weight,
            label,
        });
        Ok(())
    }

    /// Removes and returns the most recently pushed member.
    pub fn pop(&mut self) -> Option<TreeEntry> {
        self.entries.pop()
    }

    /// Current scoring weights in member order.
    pub fn weights(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.weight).collect()
    }

    /// Scoring weight of member `index`.
    pub fn weight(&self, index: usize) -> f64 {
        self.entries[index].weight
    }

    /// Replaces the full weight vector.
    ///
    /// Non-permanent updates are temporary scoring overrides the caller
    /// must later restore or commit; permanent updates also fix the
    /// weights a snapshot persists.
    pub fn update_weights(&mut self, weights: &[f64], permanent: bool) -> Result<()> {
        if weights.len() != self.entries.len() {
            return Err(RankForestError::ensemble(format!(
                "weight vector length {} does not match ensemble size {}",
                weights.len(),
                self.entries.len()
            )));
        }
        for (entry, &weight) in self.entries.iter_mut().zip(weights) {
            entry.weight = weight;
            if permanent {
                entry.saved_weight = weight;
            }
        }
        Ok(())
    }

    /// Removes zero-weight members, preserving the relative order of the
    /// survivors. Returns the surviving members' former indices so that
    /// callers can remap any external parallel arrays (drop counters,
    /// for one); every prior index into the ensemble is invalidated.
    pub fn compact(&mut self) -> Vec<usize> {
        let mut survivors = Vec::with_capacity(self.entries.len());
        let mut kept = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.drain(..).enumerate() {
            if entry.weight != 0.0 {
                survivors.push(index);
                kept.push(entry);
            }
        }
        self.entries = kept;
        survivors
    }

    /// Scores one instance: the weighted sum of the nonzero-weight
    /// members' predictions.
    pub fn score_instance(&self, dataset: &Dataset, instance: usize) -> Score {
        self.entries
            .iter()
            .filter(|e| e.weight != 0.0)
            .map(|e| e.weight * e.tree.predict(dataset, instance))
            .sum()
    }

    /// Fully recomputes a score array from scratch. Used at resume time
    /// and periodically to bound floating-point drift from incremental
    /// maintenance.
    pub fn score_dataset(&self, dataset: &Dataset, scores: &mut [Score]) {
        scores
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, s)| *s = self.score_instance(dataset, i));
    }

    /// Applies the listed members' weighted contributions to a running
    /// score array, adding or subtracting. The members' current weights
    /// at call time are used, which is what makes paired
    /// subtract-then-add sequences restore scores exactly.
    pub fn update_scores(
        &self,
        dataset: &Dataset,
        scores: &mut [Score],
        members: &[usize],
        direction: ScoreUpdate,
    ) {
        let sign = match direction {
            ScoreUpdate::Add => 1.0,
            ScoreUpdate::Subtract => -1.0,
        };
        for &member in members {
            let entry = &self.entries[member];
            let weight = entry.weight;
            scores.par_iter_mut().enumerate().for_each(|(i, s)| {
                *s += sign * weight * entry.tree.predict(dataset, i);
            });
        }
    }

    /// Exposes the ensemble as per-instance meta-features: column `t` of
    /// the result is member `t`'s weighted contribution to every
    /// instance. Labels and query grouping carry over from the scored
    /// dataset.
    pub fn meta_features(&self, dataset: &Dataset) -> Result<Dataset> {
        if self.entries.is_empty() {
            return Err(RankForestError::ensemble(
                "cannot expose an empty ensemble as meta features",
            ));
        }
        let n = dataset.num_instances();
        let mut columns = vec![0.0f32; n * self.entries.len()];
        columns
            .par_chunks_mut(self.entries.len())
            .enumerate()
            .for_each(|(i, row)| {
                for (t, entry) in self.entries.iter().enumerate() {
                    row[t] = (entry.weight * entry.tree.predict(dataset, i)) as f32;
                }
            });
        let features =
            ndarray::Array2::from_shape_vec((n, self.entries.len()), columns).map_err(|e| {
                RankForestError::ensemble(format!("meta feature shape error: {}", e))
            })?;
        Dataset::new(
            features,
            dataset.labels().clone(),
            dataset.query_offsets().to_vec(),
        )
    }
}

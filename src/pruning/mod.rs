//! Post-hoc ensemble pruning over tree-output meta-features.
//!
//! A trained ensemble is exposed as a dataset whose columns are the
//! members' weighted per-instance contributions; member weights start at
//! 1.0 so the initial meta-score equals the ensemble score. Selection
//! strategies zero out the weights of pruned members; an optional line
//! search jointly re-optimizes the survivors before and after pruning,
//! the post-pruning pass running on a filtered dataset with the pruned
//! columns physically removed.

pub mod line_search;

pub use line_search::LineSearch;

use crate::config::{PruningMethod, PruningParams};
use crate::core::{Random, RankForestError, Result, Score};
use crate::dataset::Dataset;
use crate::ensemble::Ensemble;
use crate::metrics::Metric;
use line_search::weighted_scores;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Ensemble pruning engine.
#[derive(Debug)]
pub struct EnsemblePruning {
    params: PruningParams,
    line_search: Option<LineSearch>,
    weights: Vec<f64>,
}

impl EnsemblePruning {
    /// Creates a pruning engine, failing fast when the selection method
    /// requires a line search collaborator that was not supplied.
    pub fn new(params: PruningParams, line_search: Option<LineSearch>) -> Result<Self> {
        params.validate()?;
        if params.method.requires_line_search() && line_search.is_none() {
            return Err(RankForestError::config(format!(
                "pruning method {} requires line search",
                params.method
            )));
        }
        Ok(EnsemblePruning {
            params,
            line_search,
            weights: Vec::new(),
        })
    }

    /// Final member weights after `learn`; zero entries mark pruned
    /// members.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Selects members to prune on a meta-feature dataset and learns the
    /// final weight vector.
    pub fn learn(
        &mut self,
        training: &Dataset,
        metric: &dyn Metric,
        rng: &mut Random,
    ) -> Result<()> {
        let n_members = training.num_features();
        let prune_count = if self.params.rate < 1.0 {
            (self.params.rate * n_members as f64).round() as usize
        } else {
            self.params.rate as usize
        };
        if prune_count >= n_members {
            return Err(RankForestError::resource(format!(
                "pruning {} of {} members would remove the entire ensemble",
                prune_count, n_members
            )));
        }
        let select_count = n_members - prune_count;

        self.weights = vec![1.0; n_members];

        let mut scores: Vec<Score> = vec![0.0; training.num_instances()];
        weighted_scores(training, &self.weights, &mut scores);
        log::info!(
            "before pruning: {} on training = {:.4}",
            metric.name(),
            metric.evaluate(training, &scores)
        );

        if prune_count == 0 {
            log::info!("retain count equals the ensemble size, nothing to prune");
            return Ok(());
        }

        // Some methods rank members by line-search weights, so the
        // pre-pruning search must run first (unless pre-trained weights
        // were supplied with the collaborator).
        if self.params.method.requires_line_search() {
            let search = self
                .line_search
                .as_mut()
                .expect("line search checked at construction");
            if search.weights().is_empty() {
                log::info!("line search pre-pruning");
                search.learn(training, metric)?;
            } else {
                log::info!("line search pre-pruning already done");
            }
            self.weights = search.weights().to_vec();
        }

        let pruned = match self.params.method {
            PruningMethod::Random => self.random_pruning(prune_count, n_members, rng),
            PruningMethod::LowWeights => self.low_weights_pruning(prune_count),
            PruningMethod::Last => last_pruning(prune_count, n_members),
            PruningMethod::Skip => skip_pruning(select_count, n_members),
            PruningMethod::QualityLoss => {
                self.quality_loss_pruning(prune_count, training, metric, &scores)
            }
            PruningMethod::ScoreLoss => self.score_loss_pruning(prune_count, training),
        };

        for &member in &pruned {
            self.weights[member] = 0.0;
        }

        if let Some(search) = self.line_search.as_mut() {
            // Re-optimize the survivors on a dataset with the pruned
            // columns physically removed.
            let filtered = training.filter_features(&pruned)?;
            log::info!("line search post-pruning");
            search.learn(&filtered, metric)?;

            let learned = search.weights();
            let mut cursor = 0;
            for (member, weight) in self.weights.iter_mut().enumerate() {
                if !pruned.contains(&member) {
                    *weight = learned[cursor];
                    cursor += 1;
                }
            }
            debug_assert_eq!(cursor, learned.len());
        }

        weighted_scores(training, &self.weights, &mut scores);
        log::info!(
            "after pruning {} members: {} on training = {:.4}",
            pruned.len(),
            metric.name(),
            metric.evaluate(training, &scores)
        );
        Ok(())
    }

    /// Prunes a trained ensemble in place: learns the selection on the
    /// ensemble's meta-features, folds the learned weights into the
    /// member weights permanently and compacts. Returns the survivors'
    /// former indices.
    pub fn prune_ensemble(
        &mut self,
        ensemble: &mut Ensemble,
        dataset: &Dataset,
        metric: &dyn Metric,
        rng: &mut Random,
    ) -> Result<Vec<usize>> {
        let meta = ensemble.meta_features(dataset)?;
        self.learn(&meta, metric, rng)?;

        let mut combined = ensemble.weights();
        for (weight, &factor) in combined.iter_mut().zip(&self.weights) {
            *weight *= factor;
        }
        ensemble.update_weights(&combined, true)?;
        Ok(ensemble.compact())
    }

    fn random_pruning(
        &self,
        prune_count: usize,
        n_members: usize,
        rng: &mut Random,
    ) -> BTreeSet<usize> {
        let mut pruned = BTreeSet::new();
        while pruned.len() < prune_count {
            pruned.insert(rng.below(n_members));
        }
        pruned
    }

    fn low_weights_pruning(&self, prune_count: usize) -> BTreeSet<usize> {
        let mut order: Vec<usize> = (0..self.weights.len()).collect();
        order.sort_by(|&a, &b| {
            self.weights[a]
                .partial_cmp(&self.weights[b])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order.into_iter().take(prune_count).collect()
    }

    fn quality_loss_pruning(
        &self,
        prune_count: usize,
        training: &Dataset,
        metric: &dyn Metric,
        base_scores: &[Score],
    ) -> BTreeSet<usize> {
        // Simulate each member's removal by subtracting its contribution
        // from the base scores; the members whose removal leaves the
        // highest metric hurt least.
        let n_members = training.num_features();
        let metric_without: Vec<f64> = (0..n_members)
            .into_par_iter()
            .map(|member| {
                let weight = self.weights[member];
                let adjusted: Vec<Score> = base_scores
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| s - weight * training.get(i, member) as f64)
                    .collect();
                metric.evaluate(training, &adjusted)
            })
            .collect();

        let mut order: Vec<usize> = (0..n_members).collect();
        order.sort_by(|&a, &b| {
            metric_without[b]
                .partial_cmp(&metric_without[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order.into_iter().take(prune_count).collect()
    }

    fn score_loss_pruning(&self, prune_count: usize, training: &Dataset) -> BTreeSet<usize> {
        // Cheap proxy for quality loss: rank members by their total
        // weighted contribution to the output score.
        let n_members = training.num_features();
        let contributions: Vec<f64> = (0..n_members)
            .into_par_iter()
            .map(|member| {
                let weight = self.weights[member];
                (0..training.num_instances())
                    .map(|i| weight * training.get(i, member) as f64)
                    .sum()
            })
            .collect();

        let mut order: Vec<usize> = (0..n_members).collect();
        order.sort_by(|&a, &b| {
            contributions[a]
                .partial_cmp(&contributions[b])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order.into_iter().take(prune_count).collect()
    }
}

fn last_pruning(prune_count: usize, n_members: usize) -> BTreeSet<usize> {
    (n_members - prune_count..n_members).collect()
}

fn skip_pruning(select_count: usize, n_members: usize) -> BTreeSet<usize> {
    let stride = n_members as f64 / select_count as f64;
    let selected: BTreeSet<usize> = (0..select_count)
        .map(|i| ((i as f64 * stride).ceil() as usize).min(n_members - 1))
        .collect();
    (0..n_members).filter(|m| !selected.contains(m)).collect()
}

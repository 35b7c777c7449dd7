//! Dropout (DART) overlay for the boosting driver.
//!
//! Each iteration may temporarily remove a sampled subset of ensemble
//! members before the new tree is fit, then decide from a dual
//! evaluation whether the dropout becomes permanent or is undone with a
//! joint renormalization of the new tree and the dropped members.
//!
//! The interleaving of temporary dropout, fit, dual evaluation,
//! conditional permanent drop and renormalization is sequence sensitive:
//! metric values differ under reordering, so the steps below keep their
//! exact relative order.

use super::{IterationPolicy, TrainContext};
use crate::config::{DartNormalization, DartParams, DartSampling};
use crate::core::Result;
use crate::ensemble::ScoreUpdate;
use crate::tree::RegressionTree;
use rayon::prelude::*;

pub(crate) struct DartOverlay {
    params: DartParams,
    shrinkage: f64,
    /// Effective keep_drop; count-based samplers force it off.
    keep_drop: bool,
    /// Per-member drop counters, parallel to the ensemble.
    counts: Vec<u32>,
    /// Weight vector at iteration start; extended with the new tree's
    /// weight by the renormalization when the dropout is undone.
    orig_weights: Vec<f64>,
    /// Members dropped this iteration.
    dropped: Vec<usize>,
    trees_to_dropout: usize,
    dropout_better: bool,
    last_tree_weight: f64,
    metric_training_dropout: f64,
    metric_validation_dropout: f64,
    /// Weight vector recorded at the last best iteration, restored by
    /// the final rollback.
    best_weights: Vec<f64>,
    /// Members zeroed since the last compaction, for reporting.
    dropped_before_cleaning: usize,
    last_global_scoring: usize,
}

impl DartOverlay {
    pub(crate) fn new(params: DartParams, shrinkage: f64, initial_size: usize) -> Self {
        let keep_drop = params.keep_drop && params.sample_type.count_threshold().is_none();
        DartOverlay {
            params,
            shrinkage,
            keep_drop,
            counts: vec![0; initial_size],
            orig_weights: Vec::new(),
            dropped: Vec::new(),
            trees_to_dropout: 0,
            dropout_better: false,
            last_tree_weight: 0.0,
            metric_training_dropout: 0.0,
            metric_validation_dropout: 0.0,
            best_weights: Vec::new(),
            dropped_before_cleaning: 0,
            last_global_scoring: 0,
        }
    }

    /// Selects the dropout set among positive-weight members.
    fn select_dropout(&self, n_drop: usize, ctx: &mut TrainContext<'_>) -> Vec<usize> {
        let weights = &self.orig_weights;
        let mut dropped = Vec::with_capacity(n_drop);

        match self.params.sample_type {
            DartSampling::Uniform
            | DartSampling::TopHalf
            | DartSampling::Count2
            | DartSampling::Count3
            | DartSampling::Count2N
            | DartSampling::Count3N => {
                let size = if self.params.sample_type == DartSampling::TopHalf {
                    weights.len() / 2
                } else {
                    weights.len()
                };
                let mut idx: Vec<usize> = (0..size).collect();
                ctx.rng.shuffle(&mut idx);
                for candidate in idx {
                    if dropped.len() >= n_drop {
                        break;
                    }
                    if weights[candidate] > 0.0 {
                        dropped.push(candidate);
                    }
                }
            }
            DartSampling::Weighted | DartSampling::WeightedInv => {
                let inverted = self.params.sample_type == DartSampling::WeightedInv;
                let mut excluded = vec![false; weights.len()];
                let mut sum_weights: f64 = weights.iter().sum();
                while dropped.len() < n_drop {
                    let mut cumulative = Vec::with_capacity(weights.len());
                    let mut total = 0.0;
                    for (i, &weight) in weights.iter().enumerate() {
                        let mut p = if excluded[i] || weight <= 0.0 || sum_weights <= 0.0 {
                            0.0
                        } else {
                            weight / sum_weights
                        };
                        if inverted && p > 0.0 {
                            p = 1.0 - p;
                        }
                        total += p;
                        cumulative.push(total);
                    }
                    if total <= 0.0 {
                        // Zero-sum pool: nothing left to draw from.
                        break;
                    }
                    let draw = ctx.rng.uniform();
                    let Some(index) = cumulative.iter().position(|&c| draw < c) else {
                        break;
                    };
                    dropped.push(index);
                    excluded[index] = true;
                    sum_weights -= weights[index];
                }
            }
        }
        dropped
    }

    /// Weight of the freshly fitted tree under the normalization type.
    fn normalized_tree_weight(
        &self,
        ctx: &mut TrainContext<'_>,
        tree: &RegressionTree,
    ) -> Result<f64> {
        let k = self.trees_to_dropout as f64;
        let s = self.shrinkage;
        let weight = match self.params.normalize_type {
            DartNormalization::Tree
            | DartNormalization::None
            | DartNormalization::Weighted
            | DartNormalization::Forest => s,
            DartNormalization::TreeAdaptive => s / (s + k),
            DartNormalization::TreeBoost3 => (s * 3.0) / (s * 3.0 + k),
            DartNormalization::LineSearch => self.line_search_weight(ctx, tree),
        };
        Ok(weight)
    }

    /// Bounded 1-D search over candidate weights for the new tree,
    /// maximizing the metric on training scores that already exclude the
    /// dropped members.
    fn line_search_weight(&self, ctx: &TrainContext<'_>, tree: &RegressionTree) -> f64 {
        const NUM_POINTS: usize = 16;
        const WINDOW: f64 = 1.0;
        const START: f64 = 1.0;
        let step = 2.0 * WINDOW / NUM_POINTS as f64;

        let candidates: Vec<f64> = (0..=NUM_POINTS)
            .map(|p| START - WINDOW + p as f64 * step)
            .filter(|&w| w > 0.0)
            .collect();

        let n = ctx.training.num_instances();
        let tree_scores: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| tree.predict(ctx.training, i))
            .collect();

        let metric_scores: Vec<f64> = candidates
            .par_iter()
            .map(|&candidate| {
                let scores: Vec<f64> = ctx
                    .scores_training
                    .iter()
                    .zip(&tree_scores)
                    .map(|(&base, &contribution)| base + candidate * contribution)
                    .collect();
                ctx.metric.evaluate(ctx.training, &scores)
            })
            .collect();

        let mut best = 0;
        for (p, &score) in metric_scores.iter().enumerate() {
            if score > metric_scores[best] {
                best = p;
            }
        }
        candidates[best]
    }

    /// Undoing a dropout: appends the new tree's weight to `weights` and
    /// rescales the dropped members so the restored forest stays
    /// comparable to the pre-dropout one.
    fn normalize_restore(&self, weights: &mut Vec<f64>) {
        let k = self.trees_to_dropout as f64;
        let s = self.shrinkage;
        match self.params.normalize_type {
            DartNormalization::Tree
            | DartNormalization::TreeAdaptive
            | DartNormalization::TreeBoost3 => {
                let alpha = if self.params.normalize_type == DartNormalization::TreeBoost3 {
                    3.0
                } else {
                    1.0
                };
                weights.push((s * alpha) / (s * alpha + k));
                let norm = k / (k + s * alpha);
                for &t in &self.dropped {
                    weights[t] *= norm;
                }
            }
            DartNormalization::None => {
                weights.push(s);
            }
            DartNormalization::Weighted => {
                let dropped_sum: f64 = self.dropped.iter().map(|&t| weights[t]).sum();
                let sum_with_last = dropped_sum + s;
                let norm = dropped_sum / sum_with_last;
                weights.push(s / sum_with_last);
                for &t in &self.dropped {
                    weights[t] *= norm;
                }
            }
            DartNormalization::Forest => {
                weights.push(s / (1.0 + s));
                let norm = 1.0 / (1.0 + s);
                for &t in &self.dropped {
                    weights[t] *= norm;
                }
            }
            DartNormalization::LineSearch => {
                let last = self.last_tree_weight;
                weights.push(last / (last + k));
                let norm = k / (k + last);
                for &t in &self.dropped {
                    weights[t] *= norm;
                }
            }
        }
    }
}

impl IterationPolicy for DartOverlay {
    fn begin_iteration(&mut self, ctx: &mut TrainContext<'_>) -> Result<()> {
        self.orig_weights = ctx.ensemble.weights();
        self.dropped.clear();
        self.trees_to_dropout = 0;
        self.dropout_better = false;
        self.metric_training_dropout = 0.0;
        self.metric_validation_dropout = 0.0;

        let skip_draw = ctx.rng.uniform();
        let mut n_drop = 0;
        if skip_draw > self.params.skip_drop {
            if self.params.rate_drop >= 1.0 {
                let requested = self.params.rate_drop as usize;
                // Do not drop when the ensemble is smaller than twice
                // the requested count.
                if requested * 2 <= ctx.ensemble.len() {
                    n_drop = requested;
                }
            } else {
                n_drop = (self.params.rate_drop * self.orig_weights.len() as f64).round() as usize;
            }
        }

        if n_drop > 0 {
            self.dropped = self.select_dropout(n_drop, ctx);
            // An empty candidate set skips dropout for this iteration.
            self.trees_to_dropout = self.dropped.len();
        }

        if self.trees_to_dropout > 0 {
            let dropped = self.dropped.clone();
            ctx.update_training_scores(&dropped, ScoreUpdate::Subtract);
            self.metric_training_dropout = ctx.evaluate_training();
            if ctx.has_validation() {
                ctx.update_validation_scores(&dropped, ScoreUpdate::Subtract);
                self.metric_validation_dropout = ctx.evaluate_validation();
            }
            self.dropout_better = if ctx.has_validation() {
                self.metric_validation_dropout > ctx.metric_on_validation
            } else {
                self.metric_training_dropout > ctx.metric_on_training
            };

            let mut dropped_weights = self.orig_weights.clone();
            for &t in &self.dropped {
                dropped_weights[t] = 0.0;
            }
            ctx.ensemble.update_weights(&dropped_weights, false)?;
        }
        Ok(())
    }

    fn tree_weight(&mut self, ctx: &mut TrainContext<'_>, tree: &RegressionTree) -> Result<f64> {
        let weight = self.normalized_tree_weight(ctx, tree)?;
        self.last_tree_weight = weight;
        Ok(weight)
    }

    fn accept(&mut self, ctx: &mut TrainContext<'_>) -> Result<(f64, f64)> {
        let last = ctx.ensemble.len() - 1;
        self.counts.push(0);

        // Fit evaluation: dropped members out, new tree in.
        ctx.update_training_scores(&[last], ScoreUpdate::Add);
        let metric_training_fit = ctx.evaluate_training();
        let metric_validation_fit = if ctx.has_validation() {
            ctx.update_validation_scores(&[last], ScoreUpdate::Add);
            ctx.evaluate_validation()
        } else {
            f64::MIN
        };

        let fit_better = self.trees_to_dropout > 0
            && if ctx.has_validation() {
                metric_validation_fit > ctx.metric_on_validation
            } else {
                metric_training_fit > ctx.metric_on_training
            };

        let mut metric_training;
        let mut metric_validation;
        if self.keep_drop && fit_better {
            // The dropout is retained: dropped members stay zero
            // weighted until the next compaction.
            self.dropped_before_cleaning += self.trees_to_dropout;
            metric_training = metric_training_fit;
            metric_validation = metric_validation_fit;
        } else {
            // Undo the new tree's contribution before renormalizing.
            ctx.update_training_scores(&[last], ScoreUpdate::Subtract);
            ctx.update_validation_scores(&[last], ScoreUpdate::Subtract);

            if self.trees_to_dropout > 0 {
                let mut restored = std::mem::take(&mut self.orig_weights);
                self.normalize_restore(&mut restored);
                self.orig_weights = restored;
                ctx.ensemble.update_weights(&self.orig_weights, false)?;
            }

            // Re-apply the dropped members and the new tree under the
            // renormalized weights.
            let mut update_set = self.dropped.clone();
            update_set.push(last);
            ctx.update_training_scores(&update_set, ScoreUpdate::Add);
            metric_training = ctx.evaluate_training();
            metric_validation = if ctx.has_validation() {
                ctx.update_validation_scores(&update_set, ScoreUpdate::Add);
                ctx.evaluate_validation()
            } else {
                f64::MIN
            };
        }

        // Count-based permanent removal of repeatedly dropped members.
        let mut dropped_by_count = 0;
        if let Some(threshold) = self.params.sample_type.count_threshold() {
            if fit_better {
                let mut to_drop = Vec::new();
                for &t in &self.dropped {
                    self.counts[t] += 1;
                    if self.counts[t] >= threshold && self.orig_weights[t] > 0.0 {
                        to_drop.push(t);
                    }
                }
                if !to_drop.is_empty() {
                    self.dropped_before_cleaning += to_drop.len();
                    dropped_by_count = to_drop.len();

                    if self.params.sample_type.redistributes_freed_weight() {
                        // Remove the dropped members and the new tree,
                        // redistribute the freed weight, re-apply.
                        let mut update_set = self.dropped.clone();
                        update_set.push(last);
                        ctx.update_training_scores(&update_set, ScoreUpdate::Subtract);
                        ctx.update_validation_scores(&update_set, ScoreUpdate::Subtract);

                        let denom = (self.trees_to_dropout - to_drop.len() + 1) as f64;
                        self.orig_weights[last] *= 1.0 / denom;
                        for &t in &self.dropped {
                            self.orig_weights[t] *= self.trees_to_dropout as f64 / denom;
                        }
                        for &t in &to_drop {
                            self.orig_weights[t] = 0.0;
                        }
                        ctx.ensemble.update_weights(&self.orig_weights, false)?;

                        ctx.update_training_scores(&update_set, ScoreUpdate::Add);
                        ctx.update_validation_scores(&update_set, ScoreUpdate::Add);
                    } else {
                        ctx.update_training_scores(&to_drop, ScoreUpdate::Subtract);
                        ctx.update_validation_scores(&to_drop, ScoreUpdate::Subtract);
                        for &t in &to_drop {
                            self.orig_weights[t] = 0.0;
                        }
                        ctx.ensemble.update_weights(&self.orig_weights, false)?;
                    }

                    metric_training = ctx.evaluate_training();
                    if ctx.has_validation() {
                        metric_validation = ctx.evaluate_validation();
                    }
                }
            }
        }

        log::debug!(
            "dart: dropped {} (by count {}), dropout {:.4}{} fit {:.4}{} accepted {:.4}, live size {}",
            self.trees_to_dropout,
            dropped_by_count,
            self.metric_training_dropout,
            if self.dropout_better { "*" } else { "" },
            metric_training_fit,
            if fit_better { "*" } else { "" },
            metric_training,
            ctx.ensemble.len() - self.dropped_before_cleaning,
        );

        Ok((metric_training, metric_validation))
    }

    fn on_improved(&mut self, ctx: &mut TrainContext<'_>, iteration: usize) -> Result<()> {
        if self.params.sample_type.count_threshold().is_some() {
            // The compaction below invalidates ensemble indices; the
            // drop counters must survive it aligned to the survivors.
            let weights = ctx.ensemble.weights();
            self.counts = self
                .counts
                .iter()
                .zip(&weights)
                .filter(|(_, &w)| w > 0.0)
                .map(|(&c, _)| c)
                .collect();
        }
        ctx.ensemble.compact();
        self.best_weights = ctx.ensemble.weights();
        self.dropped_before_cleaning = 0;

        if iteration - self.last_global_scoring > 10 {
            // Bound floating-point drift from incremental updates.
            ctx.rescore_all();
            self.last_global_scoring = iteration;
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut TrainContext<'_>) -> Result<()> {
        ctx.ensemble.update_weights(&self.best_weights, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boosting::Booster;
    use crate::config::{BoostingParams, TreeParams};
    use crate::dataset::Dataset;
    use crate::metrics::PointwiseRmse;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn regression_dataset() -> Dataset {
        let values: Vec<f32> = (0..32).map(|v| v as f32).collect();
        let labels: Vec<f32> = values
            .iter()
            .map(|&v| if v < 16.0 { 1.0 } else { -1.0 })
            .collect();
        let features = Array2::from_shape_vec((32, 1), values).unwrap();
        Dataset::new(features, Array1::from_vec(labels), vec![0, 16, 32]).unwrap()
    }

    fn boosting_params(n_trees: usize) -> BoostingParams {
        BoostingParams {
            n_trees,
            shrinkage: 0.3,
            early_stopping_rounds: 0,
            tree: TreeParams {
                n_leaves: 4,
                min_leaf_support: 1,
                ..TreeParams::default()
            },
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_dart_training_fits() {
        let ds = regression_dataset();
        let dart = DartParams {
            sample_type: DartSampling::Uniform,
            normalize_type: DartNormalization::Tree,
            rate_drop: 0.2,
            skip_drop: 0.0,
            keep_drop: false,
        };
        let mut booster = Booster::new(boosting_params(20))
            .unwrap()
            .with_dart(dart)
            .unwrap();
        let report = booster.fit(&ds, None, &PointwiseRmse::new(), None).unwrap();
        assert!(report.best_metric_on_training > -0.5);
        assert_eq!(booster.ensemble().len(), 20);
    }

    #[test]
    fn test_dart_with_validation_restores_best_weights() {
        let ds = regression_dataset();
        let dart = DartParams {
            sample_type: DartSampling::Uniform,
            normalize_type: DartNormalization::Tree,
            rate_drop: 0.3,
            skip_drop: 0.0,
            keep_drop: true,
        };
        let mut booster = Booster::new(boosting_params(15))
            .unwrap()
            .with_dart(dart)
            .unwrap();
        let report = booster
            .fit(&ds, Some(&ds), &PointwiseRmse::new(), None)
            .unwrap();

        // After rollback, the scoring weights are the permanently
        // committed best weights.
        let ensemble = booster.ensemble();
        for t in 0..ensemble.len() {
            assert_eq!(ensemble.entry(t).weight(), ensemble.entry(t).saved_weight());
        }
        assert!(report.best_metric_on_validation.unwrap() > -0.6);
    }

    #[test]
    fn test_count_sampler_eventually_removes_trees() {
        let ds = regression_dataset();
        let dart = DartParams {
            sample_type: DartSampling::Count2,
            normalize_type: DartNormalization::Tree,
            rate_drop: 0.4,
            skip_drop: 0.0,
            keep_drop: true, // forced off internally for count samplers
        };
        let mut booster = Booster::new(boosting_params(25))
            .unwrap()
            .with_dart(dart)
            .unwrap();
        booster
            .fit(&ds, Some(&ds), &PointwiseRmse::new(), None)
            .unwrap();
        // Count-based removal plus compaction keeps the ensemble at or
        // below the cap with all-nonzero weights.
        assert!(booster.ensemble().weights().iter().all(|&w| w != 0.0));
    }

    #[test]
    fn test_tree_normalization_weights() {
        // After a non-retained dropout of k trees under Tree
        // normalization, the new tree weighs shrinkage/(shrinkage+k) and
        // each dropped tree is scaled by k/(k+shrinkage).
        let params = DartParams {
            sample_type: DartSampling::Uniform,
            normalize_type: DartNormalization::Tree,
            rate_drop: 0.5,
            skip_drop: 0.0,
            keep_drop: false,
        };
        let mut overlay = DartOverlay::new(params, 0.1, 0);
        overlay.trees_to_dropout = 2;
        overlay.dropped = vec![0, 1];

        let mut weights = vec![0.1, 0.1, 0.1];
        overlay.normalize_restore(&mut weights);
        assert_eq!(weights.len(), 4);
        assert_abs_diff_eq!(weights[3], 0.1 / 2.1, epsilon = 1e-12);
        assert_abs_diff_eq!(weights[0], 0.1 * 2.0 / 2.1, epsilon = 1e-12);
        assert_abs_diff_eq!(weights[1], 0.1 * 2.0 / 2.1, epsilon = 1e-12);
        // Untouched member keeps its weight.
        assert_abs_diff_eq!(weights[2], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_sampler_zero_pool_skips_dropout() {
        let params = DartParams {
            sample_type: DartSampling::Weighted,
            normalize_type: DartNormalization::Tree,
            rate_drop: 2.0,
            skip_drop: 0.0,
            keep_drop: false,
        };
        let overlay = DartOverlay::new(params, 0.1, 0);

        let boosting = boosting_params(4);
        let ds = regression_dataset();
        let metric = PointwiseRmse::new();
        let mut ensemble = crate::ensemble::Ensemble::with_capacity(4);
        let mut ctx = TrainContext::new(&boosting, &ds, None, &metric, &mut ensemble);

        let mut zero_weighted = overlay;
        zero_weighted.orig_weights = vec![0.0, 0.0, 0.0, 0.0];
        let dropped = zero_weighted.select_dropout(2, &mut ctx);
        assert!(dropped.is_empty());
    }
}

//! Instance sample selection strategies for the boosting driver.
//!
//! The plain variant trains every tree on the full instance set. The
//! stratified variant re-selects, per query, all positives plus a mix of
//! rank-ordered "hard" negatives and uniformly random negatives, with
//! the mixing ratio shifted adaptively by how many recent iterations
//! improved the best metric.

use super::TrainContext;
use crate::config::{AdaptiveStrategy, NegativeStrategy, SelectiveParams};

/// Decides which instances the next tree is fit on.
pub(crate) trait SampleSelector {
    /// Refreshes the active sample for the coming iteration.
    fn refresh(&mut self, ctx: &mut TrainContext<'_>, iteration: usize);

    /// Feeds the improvement outcome of the finished iteration back into
    /// the adaptive window.
    fn record_improvement(&mut self, _improved: bool) {}
}

/// Trains on every instance.
pub(crate) struct FullSelector;

impl SampleSelector for FullSelector {
    fn refresh(&mut self, ctx: &mut TrainContext<'_>, _iteration: usize) {
        let n = ctx.sample.ids_orig.len();
        ctx.sample.ids.copy_from_slice(&ctx.sample.ids_orig);
        ctx.sample.n_active = n;
    }
}

/// Per-query stratified negative sampling.
pub(crate) struct StratifiedSelector {
    params: SelectiveParams,
    n_positives: Vec<usize>,
    improvements: Vec<bool>,
    cursor: usize,
    initialized: bool,
}

impl StratifiedSelector {
    pub(crate) fn new(params: SelectiveParams) -> Self {
        StratifiedSelector {
            params,
            n_positives: Vec::new(),
            improvements: Vec::new(),
            cursor: 0,
            initialized: false,
        }
    }

    /// Fraction of recent iterations that improved the best metric.
    fn adapt_factor(&self) -> f64 {
        if self.improvements.is_empty() {
            return 1.0;
        }
        let improved = self.improvements.iter().filter(|&&b| b).count();
        improved as f64 / self.improvements.len() as f64
    }

    /// Current (rank, random) sampling factors under the adaptive
    /// strategy. More improvement shifts toward the configured ratio,
    /// stagnation toward the alternative extreme.
    fn factors(&self) -> (f64, f64) {
        let adapt = self.adapt_factor();
        let inv_adapt = 1.0 - adapt;
        let rank = self.params.rank_sampling_factor;
        let random = self.params.random_sampling_factor;
        match self.params.adaptive_strategy {
            AdaptiveStrategy::None => (rank, random),
            AdaptiveStrategy::Fixed => {
                let min = rank.min(random);
                let max = rank.max(random);
                let blended = min + inv_adapt * (max - min);
                (blended, blended)
            }
            AdaptiveStrategy::Ratio => {
                let sum = rank + random;
                let rank_part = sum * adapt;
                (rank_part, sum - rank_part)
            }
            AdaptiveStrategy::Mix => {
                let min = rank.min(random);
                let max = rank.max(random);
                let blended = min + inv_adapt * (max - min);
                let rank_part = blended * adapt;
                (rank_part, blended - rank_part)
            }
        }
    }

    /// Reorders every query block so positives and the selected
    /// negatives form a prefix, then compacts those prefixes into the
    /// front of the id array. Returns the active count.
    fn select(&mut self, ctx: &mut TrainContext<'_>) -> usize {
        let (rank_factor, random_factor) = self.factors();
        log::debug!(
            "stratified selection: rank factor {:.3}, random factor {:.3}, adapt {:.3}",
            rank_factor,
            random_factor,
            self.adapt_factor()
        );

        let training = ctx.training;
        let mut active: Vec<usize> = Vec::with_capacity(training.num_instances());

        for q in 0..training.num_queries() {
            let (start, end) = training.query_bounds(q);
            let query_size = end - start;
            let n_pos = self.n_positives[q];
            let n_neg = query_size - n_pos;

            let (n_top, n_random) = {
                let scores = &ctx.scores_training;
                let block = &mut ctx.sample.ids[start..end];
                match self.params.negative_strategy {
                    NegativeStrategy::Ratio => (
                        round_count(rank_factor * n_neg as f64),
                        round_count(random_factor * n_neg as f64),
                    ),
                    NegativeStrategy::Mul => (
                        round_count(rank_factor * n_pos as f64).min(n_neg),
                        round_count(random_factor * n_pos as f64).min(n_neg),
                    ),
                    NegativeStrategy::Pos => {
                        if n_pos == 0 {
                            (0, 0)
                        } else {
                            block.sort_unstable_by(|&a, &b| {
                                scores[b]
                                    .partial_cmp(&scores[a])
                                    .unwrap_or(std::cmp::Ordering::Equal)
                                    .then_with(|| a.cmp(&b))
                            });
                            let mut last_pos = 0;
                            for (rank, &i) in block.iter().enumerate() {
                                if training.label(i) > 0.0 {
                                    last_pos = rank;
                                }
                            }
                            let n_before = last_pos + 1 - n_pos;
                            let n_top = round_count(rank_factor * n_before as f64).min(n_neg);
                            let n_random =
                                round_count(random_factor * n_before as f64).min(n_neg - n_top);
                            (n_top, n_random)
                        }
                    }
                }
            };
            let n_top = n_top.min(n_neg);
            let n_random = n_random.min(n_neg - n_top);

            {
                let scores = &ctx.scores_training;
                let block = &mut ctx.sample.ids[start..end];
                // Positives first, both groups by score descending, ties
                // by instance id for determinism.
                block.sort_unstable_by(|&a, &b| {
                    let pos_a = training.label(a) > 0.0;
                    let pos_b = training.label(b) > 0.0;
                    pos_b
                        .cmp(&pos_a)
                        .then_with(|| {
                            scores[b]
                                .partial_cmp(&scores[a])
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .then_with(|| a.cmp(&b))
                });
            }

            for offset in 0..(n_pos + n_top) {
                active.push(ctx.sample.ids[start + offset]);
            }
            if n_random > 0 {
                let pool = query_size - n_pos - n_top;
                let picks = ctx.rng.sample(pool, n_random);
                for p in picks {
                    active.push(ctx.sample.ids[start + n_pos + n_top + p]);
                }
            }
        }

        let n_active = active.len();
        ctx.sample.ids[..n_active].copy_from_slice(&active);
        n_active
    }
}

impl SampleSelector for StratifiedSelector {
    fn refresh(&mut self, ctx: &mut TrainContext<'_>, iteration: usize) {
        if !self.initialized {
            let training = ctx.training;
            self.n_positives = (0..training.num_queries())
                .map(|q| {
                    let (start, end) = training.query_bounds(q);
                    (start..end).filter(|&i| training.label(i) > 0.0).count()
                })
                .collect();
            if self.params.adaptive_strategy != AdaptiveStrategy::None {
                self.improvements = vec![true; self.params.improvement_window];
            }
            self.initialized = true;
        }

        if iteration > 0 && iteration % self.params.sampling_iterations == 0 {
            ctx.sample.ids.copy_from_slice(&ctx.sample.ids_orig);
            let n_active = self.select(ctx);
            ctx.sample.n_active = n_active;
            log::debug!(
                "reduced training sample from {} to {} instances",
                ctx.sample.ids_orig.len(),
                n_active
            );
        }
    }

    fn record_improvement(&mut self, improved: bool) {
        if !self.improvements.is_empty() {
            let len = self.improvements.len();
            self.improvements[self.cursor % len] = improved;
            self.cursor += 1;
        }
    }
}

#[inline]
fn round_count(value: f64) -> usize {
    value.round().max(0.0) as usize
}

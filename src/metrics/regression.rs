//! Pointwise squared-error metric with residual pseudoresponses.
//!
//! Useful for plain gradient boosting on regression targets and as a
//! deterministic collaborator in tests. Evaluation is negated RMSE so
//! that higher is better, matching the ranking metrics.

use super::Metric;
use crate::core::{MetricScore, Score};
use crate::dataset::Dataset;
use rayon::prelude::*;

/// Negated root-mean-square error.
#[derive(Debug, Clone, Default)]
pub struct PointwiseRmse;

impl PointwiseRmse {
    /// Creates the metric.
    pub fn new() -> Self {
        PointwiseRmse
    }
}

impl Metric for PointwiseRmse {
    fn name(&self) -> &'static str {
        "rmse"
    }

    fn evaluate(&self, dataset: &Dataset, scores: &[Score]) -> MetricScore {
        let n = dataset.num_instances();
        let sum_sq: f64 = (0..n)
            .into_par_iter()
            .map(|i| {
                let residual = dataset.label(i) as f64 - scores[i];
                residual * residual
            })
            .sum();
        -(sum_sq / n as f64).sqrt()
    }

    fn pseudo_responses(
        &self,
        dataset: &Dataset,
        scores: &[Score],
        sample: Option<&[bool]>,
        responses: &mut [f64],
        weights: &mut [f64],
    ) {
        responses
            .par_iter_mut()
            .zip(weights.par_iter_mut())
            .enumerate()
            .for_each(|(i, (resp, wgt))| {
                if sample.map_or(true, |p| p[i]) {
                    *resp = dataset.label(i) as f64 - scores[i];
                    *wgt = 1.0;
                } else {
                    *resp = 0.0;
                    *wgt = 0.0;
                }
            });
    }
}

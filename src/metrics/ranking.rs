//! NDCG with pairwise lambda gradients.
//!
//! The pseudoresponse contract implements the standard pairwise lambda
//! scheme: for every in-query pair with unequal relevance, the swap
//! change of the truncated NDCG scales a logistic pairwise gradient.

use super::{query_chunks, Metric};
use crate::core::{MetricScore, Score};
use crate::dataset::Dataset;
use rayon::prelude::*;

/// Normalized discounted cumulative gain truncated at a cutoff rank.
#[derive(Debug, Clone)]
pub struct Ndcg {
    cutoff: usize,
}

impl Ndcg {
    /// Creates an NDCG metric truncated at rank `cutoff` (0 disables
    /// truncation).
    pub fn new(cutoff: usize) -> Self {
        Ndcg { cutoff }
    }

    /// Exponential relevance gain.
    #[inline]
    fn gain(label: f32) -> f64 {
        (2f64).powf(label as f64) - 1.0
    }

    /// Logarithmic rank discount, zero past the cutoff.
    #[inline]
    fn discount(&self, rank: usize) -> f64 {
        if self.cutoff != 0 && rank >= self.cutoff {
            return 0.0;
        }
        1.0 / (rank as f64 + 2.0).log2()
    }

    /// Ideal DCG of a label multiset.
    fn ideal_dcg(&self, labels: &mut [f32]) -> f64 {
        labels.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        labels
            .iter()
            .enumerate()
            .map(|(r, &l)| Self::gain(l) * self.discount(r))
            .sum()
    }

    /// Indices of a query block sorted by score descending, ties broken
    /// by instance index for determinism.
    fn ranked(block: &[usize], scores: &[Score]) -> Vec<usize> {
        let mut order: Vec<usize> = block.to_vec();
        order.sort_unstable_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order
    }

    fn query_ndcg(&self, dataset: &Dataset, scores: &[Score], q: usize) -> f64 {
        let (start, end) = dataset.query_bounds(q);
        let block: Vec<usize> = (start..end).collect();
        let order = Self::ranked(&block, scores);
        let mut labels: Vec<f32> = block.iter().map(|&i| dataset.label(i)).collect();
        let idcg = self.ideal_dcg(&mut labels);
        if idcg <= 0.0 {
            return 0.0;
        }
        let dcg: f64 = order
            .iter()
            .enumerate()
            .map(|(r, &i)| Self::gain(dataset.label(i)) * self.discount(r))
            .sum();
        dcg / idcg
    }
}

impl Metric for Ndcg {
    fn name(&self) -> &'static str {
        "ndcg"
    }

    fn evaluate(&self, dataset: &Dataset, scores: &[Score]) -> MetricScore {
        let n_queries = dataset.num_queries();
        let total: f64 = (0..n_queries)
            .into_par_iter()
            .map(|q| self.query_ndcg(dataset, scores, q))
            .sum();
        total / n_queries as f64
    }

    fn pseudo_responses(
        &self,
        dataset: &Dataset,
        scores: &[Score],
        sample: Option<&[bool]>,
        responses: &mut [f64],
        weights: &mut [f64],
    ) {
        responses.fill(0.0);
        weights.fill(0.0);

        let offsets = dataset.query_offsets();
        let response_chunks = query_chunks(responses, offsets);
        let weight_chunks = query_chunks(weights, offsets);

        response_chunks
            .into_par_iter()
            .zip(weight_chunks)
            .enumerate()
            .for_each(|(q, (resp, wgt))| {
                let (start, _) = dataset.query_bounds(q);
                let block: Vec<usize> = (0..resp.len())
                    .map(|o| start + o)
                    .filter(|&i| sample.map_or(true, |p| p[i]))
                    .collect();
                if block.len() < 2 {
                    return;
                }

                let mut labels: Vec<f32> = block.iter().map(|&i| dataset.label(i)).collect();
                let idcg = self.ideal_dcg(&mut labels);
                if idcg <= 0.0 {
                    return;
                }

                let order = Self::ranked(&block, scores);
                let mut rank_of = vec![0usize; block.len()];
                let mut offset_of = vec![0usize; block.len()];
                for (local, &i) in block.iter().enumerate() {
                    offset_of[local] = i - start;
                }
                let mut local_of = std::collections::HashMap::with_capacity(block.len());
                for (local, &i) in block.iter().enumerate() {
                    local_of.insert(i, local);
                }
                for (rank, &i) in order.iter().enumerate() {
                    rank_of[local_of[&i]] = rank;
                }

                for a in 0..block.len() {
                    for b in 0..block.len() {
                        let (i, j) = (block[a], block[b]);
                        let (li, lj) = (dataset.label(i), dataset.label(j));
                        if li <= lj {
                            continue;
                        }
                        let swap = (Self::gain(li) - Self::gain(lj))
                            * (self.discount(rank_of[a]) - self.discount(rank_of[b]));
                        let delta = swap.abs() / idcg;
                        if delta == 0.0 {
                            continue;
                        }
                        let rho = 1.0 / (1.0 + (scores[i] - scores[j]).exp());
                        let lambda = rho * delta;
                        let hessian = rho * (1.0 - rho) * delta;
                        resp[offset_of[a]] += lambda;
                        resp[offset_of[b]] -= lambda;
                        wgt[offset_of[a]] += hessian;
                        wgt[offset_of[b]] += hessian;
                    }
                }
            });
    }
}

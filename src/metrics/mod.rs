//! Evaluation metrics and their gradient contracts.
//!
//! The boosting loop is metric agnostic: it consumes anything
//! implementing [`Metric`], which couples evaluation with the
//! pseudoresponse computation each iteration fits the next tree to.
//! Two reference implementations ship with the crate: [`Ndcg`] with
//! pairwise lambda gradients and the pointwise [`PointwiseRmse`].

pub mod ranking;
pub mod regression;

pub use ranking::Ndcg;
pub use regression::PointwiseRmse;

use crate::core::{MetricScore, Score};
use crate::dataset::Dataset;

/// Metric collaborator contract.
///
/// `evaluate` scores a model's outputs on a dataset; higher is always
/// better. `pseudo_responses` recomputes the per-instance targets (and
/// their Newton weights) the next tree is fit to approximate. When a
/// sample presence mask is given, instances outside the sample must
/// receive zero responses and zero weights.
pub trait Metric: Send + Sync {
    /// Metric name for reporting.
    fn name(&self) -> &'static str;

    /// Evaluates the metric over all queries of the dataset.
    fn evaluate(&self, dataset: &Dataset, scores: &[Score]) -> MetricScore;

    /// Writes per-instance pseudoresponses and weights for the current
    /// scores.
    fn pseudo_responses(
        &self,
        dataset: &Dataset,
        scores: &[Score],
        sample: Option<&[bool]>,
        responses: &mut [f64],
        weights: &mut [f64],
    );
}

/// Splits a buffer into per-query chunks following the offset table.
///
/// Queries are contiguous and disjoint, so the chunks can be processed
/// in parallel without locking.
pub(crate) fn query_chunks<'a>(buffer: &'a mut [f64], offsets: &[usize]) -> Vec<&'a mut [f64]> {
    let mut chunks = Vec::with_capacity(offsets.len() - 1);
    let mut rest = buffer;
    for w in offsets.windows(2) {
        let (head, tail) = rest.split_at_mut(w[1] - w[0]);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_chunks() {
        let mut buffer = vec![0.0; 6];
        let offsets = vec![0, 2, 3, 6];
        let chunks = query_chunks(&mut buffer, &offsets);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[2].len(), 3);
    }
}

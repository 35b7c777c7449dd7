//! Shared helpers for integration tests.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rankforest::Dataset;

/// Builds a synthetic ranking dataset: `n_queries` queries of
/// `docs_per_query` instances with graded relevance in {0, 1, 2} and
/// three features, two of which carry signal.
pub fn synthetic_ranking(n_queries: usize, docs_per_query: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = n_queries * docs_per_query;
    let mut feature_values = Vec::with_capacity(n * 3);
    let mut labels = Vec::with_capacity(n);
    let mut offsets = Vec::with_capacity(n_queries + 1);
    offsets.push(0);

    for _ in 0..n_queries {
        for d in 0..docs_per_query {
            let relevance = (d % 3) as f32;
            let noise = rng.gen::<f32>();
            feature_values.push(relevance + 0.3 * noise);
            feature_values.push(rng.gen::<f32>());
            feature_values.push(0.5 * relevance + 0.2 * rng.gen::<f32>());
            labels.push(relevance);
        }
        offsets.push(offsets.last().unwrap() + docs_per_query);
    }

    let features = Array2::from_shape_vec((n, 3), feature_values).unwrap();
    Dataset::new(features, Array1::from_vec(labels), offsets).unwrap()
}

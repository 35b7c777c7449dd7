//! Per-node feature histograms over discretized thresholds.
//!
//! A training run discretizes every feature once into a shared
//! [`ThresholdSet`]; node histograms then accumulate pseudoresponse
//! statistics per (feature, threshold) bin. A node's children reuse the
//! parent's work: the smaller child is scanned against the precomputed
//! bin indices and the sibling is derived by bin-wise subtraction, so no
//! raw feature value is ever compared again after the root scan.

use crate::core::{BinIndex, Feature, FeatureIndex};
use crate::dataset::Dataset;
use rayon::prelude::*;

/// Shared per-feature discretization thresholds and the precomputed bin
/// index of every instance.
#[derive(Debug, Clone)]
pub struct ThresholdSet {
    /// Sorted candidate thresholds per feature. The last threshold of a
    /// feature is its maximum value, so every instance maps to a bin.
    thresholds: Vec<Vec<Feature>>,
    /// `bin_index[feature][instance]`.
    bin_index: Vec<Vec<u32>>,
}

impl ThresholdSet {
    /// Discretizes all features of a dataset.
    ///
    /// With `n_thresholds == 0` every distinct value becomes a
    /// threshold; otherwise at most `n_thresholds` evenly spaced
    /// distinct values are kept, the maximum always among them.
    pub fn new(dataset: &Dataset, n_thresholds: usize) -> Self {
        let n_features = dataset.num_features();
        let n_instances = dataset.num_instances();

        let per_feature: Vec<(Vec<Feature>, Vec<u32>)> = (0..n_features)
            .into_par_iter()
            .map(|f| {
                let column = dataset.feature_column(f);
                let mut distinct = column.clone();
                distinct.sort_unstable_by(|a, b| {
                    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                });
                distinct.dedup();

                let thresholds = if n_thresholds != 0 && distinct.len() > n_thresholds {
                    let mut capped: Vec<Feature> = (0..n_thresholds)
                        .map(|t| distinct[t * distinct.len() / n_thresholds])
                        .collect();
                    let last = *distinct.last().unwrap();
                    if *capped.last().unwrap() < last {
                        capped.push(last);
                    }
                    capped
                } else {
                    distinct
                };

                let mut bins = Vec::with_capacity(n_instances);
                for &value in &column {
                    // First threshold >= value; the final threshold is
                    // the feature maximum, so this always lands.
                    let bin = thresholds.partition_point(|&t| t < value);
                    bins.push(bin.min(thresholds.len() - 1) as u32);
                }
                (thresholds, bins)
            })
            .collect();

        let mut thresholds = Vec::with_capacity(n_features);
        let mut bin_index = Vec::with_capacity(n_features);
        for (t, b) in per_feature {
            thresholds.push(t);
            bin_index.push(b);
        }
        ThresholdSet {
            thresholds,
            bin_index,
        }
    }

    /// Number of discretized features.
    pub fn num_features(&self) -> usize {
        self.thresholds.len()
    }

    /// Thresholds of one feature.
    pub fn feature_thresholds(&self, feature: FeatureIndex) -> &[Feature] {
        &self.thresholds[feature]
    }

    /// Precomputed bin of an instance under a feature.
    #[inline]
    pub fn bin(&self, feature: FeatureIndex, instance: usize) -> BinIndex {
        self.bin_index[feature][instance] as BinIndex
    }
}

/// One histogram bin: pseudoresponse statistics of the instances routed
/// to it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bin {
    /// Sum of pseudoresponses.
    pub sum: f64,
    /// Sum of squared pseudoresponses.
    pub sq_sum: f64,
    /// Number of instances.
    pub count: u32,
}

/// Per-feature bin arrays for one tree node.
#[derive(Debug, Clone)]
pub struct NodeHistogram {
    bins: Vec<Vec<Bin>>,
}

impl NodeHistogram {
    /// Builds a histogram by scanning the given instances once per
    /// feature, in parallel across features.
    pub fn build(thresholds: &ThresholdSet, instances: &[usize], responses: &[f64]) -> Self {
        let bins: Vec<Vec<Bin>> = (0..thresholds.num_features())
            .into_par_iter()
            .map(|f| {
                let mut feature_bins =
                    vec![Bin::default(); thresholds.feature_thresholds(f).len()];
                for &i in instances {
                    let bin = &mut feature_bins[thresholds.bin(f, i)];
                    let response = responses[i];
                    bin.sum += response;
                    bin.sq_sum += response * response;
                    bin.count += 1;
                }
                feature_bins
            })
            .collect();
        NodeHistogram { bins }
    }

    /// Derives the sibling of `child` by subtracting it bin-wise from
    /// `parent`. Counts and sums of the two children sum to the parent's
    /// by construction.
    pub fn complement(parent: &NodeHistogram, child: &NodeHistogram) -> Self {
        let bins: Vec<Vec<Bin>> = parent
            .bins
            .iter()
            .zip(child.bins.iter())
            .map(|(parent_bins, child_bins)| {
                parent_bins
                    .iter()
                    .zip(child_bins.iter())
                    .map(|(p, c)| Bin {
                        sum: p.sum - c.sum,
                        sq_sum: p.sq_sum - c.sq_sum,
                        count: p.count - c.count,
                    })
                    .collect()
            })
            .collect();
        NodeHistogram { bins }
    }

    /// Bins of one feature.
    pub fn feature_bins(&self, feature: FeatureIndex) -> &[Bin] {
        &self.bins[feature]
    }

    /// Total (sum, squared sum, count) of the node, read off the first
    /// feature's bins.
    pub fn totals(&self) -> (f64, f64, u32) {
        self.bins[0].iter().fold((0.0, 0.0, 0), |acc, bin| {
            (acc.0 + bin.sum, acc.1 + bin.sq_sum, acc.2 + bin.count)
        })
    }

    /// Number of instances assigned to the node.
    pub fn count(&self) -> u32 {
        self.totals().2
    }

    /// Within-node sum of squared deviations from the mean
    /// pseudoresponse.
    pub fn deviance(&self) -> f64 {
        let (sum, sq_sum, count) = self.totals();
        if count == 0 {
            return 0.0;
        }
        (sq_sum - sum * sum / count as f64).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, Array2};
    use proptest::prelude::*;

    fn dataset_from(values: Vec<f32>) -> Dataset {
        let n = values.len();
        let features = Array2::from_shape_vec((n, 1), values).unwrap();
        let labels = Array1::zeros(n);
        Dataset::new(features, labels, vec![0, n]).unwrap()
    }

    #[test]
    fn test_threshold_construction() {
        let ds = dataset_from(vec![3.0, 1.0, 2.0, 2.0, 1.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        assert_eq!(thresholds.feature_thresholds(0), &[1.0, 2.0, 3.0]);
        assert_eq!(thresholds.bin(0, 0), 2);
        assert_eq!(thresholds.bin(0, 1), 0);
        assert_eq!(thresholds.bin(0, 2), 1);
    }

    #[test]
    fn test_threshold_capping() {
        let values: Vec<f32> = (0..100).map(|v| v as f32).collect();
        let ds = dataset_from(values);
        let thresholds = ThresholdSet::new(&ds, 8);
        let t = thresholds.feature_thresholds(0);
        assert!(t.len() <= 9);
        assert_eq!(*t.last().unwrap(), 99.0);
        for w in t.windows(2) {
            assert!(w[0] < w[1]);
        }
        // Every instance still maps to a valid bin.
        for i in 0..100 {
            assert!(thresholds.bin(0, i) < t.len());
        }
    }

    #[test]
    fn test_bin_counts_sum_to_instance_count() {
        let ds = dataset_from(vec![1.0, 2.0, 3.0, 4.0, 2.0, 2.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, -1.0, 0.5, 2.0, 0.0, 1.5];
        let instances: Vec<usize> = (0..6).collect();
        let hist = NodeHistogram::build(&thresholds, &instances, &responses);
        assert_eq!(hist.count(), 6);
        let total: u32 = hist.feature_bins(0).iter().map(|b| b.count).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_complement_conservation() {
        let ds = dataset_from(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, -1.0, -1.0];
        let parent = NodeHistogram::build(&thresholds, &[0, 1, 2, 3], &responses);
        let left = NodeHistogram::build(&thresholds, &[0, 1], &responses);
        let right = NodeHistogram::complement(&parent, &left);

        let (ls, lq, lc) = left.totals();
        let (rs, rq, rc) = right.totals();
        let (ps, pq, pc) = parent.totals();
        assert_eq!(lc + rc, pc);
        assert_abs_diff_eq!(ls + rs, ps, epsilon = 1e-9);
        assert_abs_diff_eq!(lq + rq, pq, epsilon = 1e-9);
    }

    #[test]
    fn test_deviance() {
        let ds = dataset_from(vec![1.0, 2.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, -1.0];
        let hist = NodeHistogram::build(&thresholds, &[0, 1], &responses);
        // Mean 0, deviations 1 and -1.
        assert_abs_diff_eq!(hist.deviance(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_multi_feature_dataset() {
        let features = array![[1.0, 9.0], [2.0, 8.0], [3.0, 7.0]];
        let labels = array![0.0, 0.0, 0.0];
        let ds = Dataset::new(features, labels, vec![0, 3]).unwrap();
        let thresholds = ThresholdSet::new(&ds, 0);
        assert_eq!(thresholds.num_features(), 2);
        assert_eq!(thresholds.feature_thresholds(1), &[7.0, 8.0, 9.0]);
        assert_eq!(thresholds.bin(1, 0), 2);
    }

    proptest! {
        #[test]
        fn prop_conservation_under_any_partition(
            values in proptest::collection::vec(-100.0f32..100.0, 4..40),
            responses_seed in proptest::collection::vec(-10.0f64..10.0, 40),
            split_at in 1usize..3,
        ) {
            let n = values.len();
            let ds = dataset_from(values);
            let thresholds = ThresholdSet::new(&ds, 0);
            let responses: Vec<f64> = responses_seed.into_iter().take(n).collect();
            let all: Vec<usize> = (0..n).collect();
            let cut = n * split_at / 3;
            let left_ids: Vec<usize> = all[..cut.max(1)].to_vec();

            let parent = NodeHistogram::build(&thresholds, &all, &responses);
            let left = NodeHistogram::build(&thresholds, &left_ids, &responses);
            let right = NodeHistogram::complement(&parent, &left);

            prop_assert_eq!(left.count() + right.count(), parent.count());
            let (ls, _, _) = left.totals();
            let (rs, _, _) = right.totals();
            let (ps, _, _) = parent.totals();
            prop_assert!((ls + rs - ps).abs() < 1e-9);
        }
    }
}

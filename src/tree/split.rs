//! Split search over node histograms.

use crate::core::{BinIndex, Feature, FeatureIndex};
use crate::tree::histogram::{NodeHistogram, ThresholdSet};
use rayon::prelude::*;

/// A fully evaluated split candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCandidate {
    /// Feature to split on.
    pub feature: FeatureIndex,
    /// Threshold bin; instances with `value <= threshold` go left.
    pub bin: BinIndex,
    /// Threshold value.
    pub threshold: Feature,
    /// Deviance reduction of the split.
    pub gain: f64,
    /// Left child pseudoresponse sum.
    pub left_sum: f64,
    /// Left child instance count.
    pub left_count: u32,
    /// Right child pseudoresponse sum.
    pub right_sum: f64,
    /// Right child instance count.
    pub right_count: u32,
}

/// Evaluates every (feature, threshold) candidate of a node histogram
/// and returns the best valid split, or `None` when no candidate passes
/// the minimum leaf support (and, optionally, the strict deviance
/// improvement policy).
///
/// Maximization is strict, so ties resolve to the first feature index
/// and then the first threshold index encountered.
pub fn find_best_split(
    histogram: &NodeHistogram,
    thresholds: &ThresholdSet,
    min_leaf_support: usize,
    require_deviance_improvement: bool,
) -> Option<SplitCandidate> {
    let (parent_sum, _, parent_count) = histogram.totals();
    if (parent_count as usize) < 2 * min_leaf_support {
        return None;
    }
    let parent_term = parent_sum * parent_sum / parent_count as f64;

    // Each feature finds its own best candidate in parallel; the final
    // reduction walks features in index order so the tie-break stays
    // deterministic regardless of scheduling.
    let per_feature: Vec<Option<SplitCandidate>> = (0..thresholds.num_features())
        .into_par_iter()
        .map(|f| {
            let bins = histogram.feature_bins(f);
            let feature_thresholds = thresholds.feature_thresholds(f);
            let mut best: Option<SplitCandidate> = None;
            let mut left_sum = 0.0;
            let mut left_count: u32 = 0;
            for (bin, stats) in bins.iter().enumerate().take(bins.len().saturating_sub(1)) {
                left_sum += stats.sum;
                left_count += stats.count;
                let right_count = parent_count - left_count;
                if (left_count as usize) < min_leaf_support
                    || (right_count as usize) < min_leaf_support
                {
                    continue;
                }
                let right_sum = parent_sum - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_term;
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature: f,
                        bin,
                        threshold: feature_thresholds[bin],
                        gain,
                        left_sum,
                        left_count,
                        right_sum,
                        right_count,
                    });
                }
            }
            best
        })
        .collect();

    let best = per_feature
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<SplitCandidate>, candidate| match acc {
            Some(current) if candidate.gain <= current.gain => Some(current),
            _ => Some(candidate),
        })?;

    if require_deviance_improvement && best.gain <= 0.0 {
        return None;
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn single_feature_dataset(values: Vec<f32>) -> Dataset {
        let n = values.len();
        let features = Array2::from_shape_vec((n, 1), values).unwrap();
        Dataset::new(features, Array1::zeros(n), vec![0, n]).unwrap()
    }

    #[test]
    fn test_best_split_between_signs() {
        // Four instances, responses +1 +1 -1 -1: the best split falls
        // between feature values 2 and 3.
        let ds = single_feature_dataset(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, -1.0, -1.0];
        let hist = NodeHistogram::build(&thresholds, &[0, 1, 2, 3], &responses);

        let split = find_best_split(&hist, &thresholds, 1, false).unwrap();
        assert_eq!(split.feature, 0);
        assert_eq!(split.threshold, 2.0);
        assert_eq!(split.left_count, 2);
        assert_eq!(split.right_count, 2);
        assert_abs_diff_eq!(split.left_sum, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(split.right_sum, -2.0, epsilon = 1e-12);
        // Gain: 4/2 + 4/2 - 0 = 4.
        assert_abs_diff_eq!(split.gain, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_min_leaf_support_rejects() {
        let ds = single_feature_dataset(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, -1.0, -1.0];
        let hist = NodeHistogram::build(&thresholds, &[0, 1, 2, 3], &responses);

        // Support 2 still allows the midpoint split.
        let split = find_best_split(&hist, &thresholds, 2, false).unwrap();
        assert_eq!(split.threshold, 2.0);
        // Support 3 cannot be met by any candidate on 4 instances.
        assert!(find_best_split(&hist, &thresholds, 3, false).is_none());
    }

    #[test]
    fn test_deviance_improvement_policy() {
        // Constant responses: every split has zero gain.
        let ds = single_feature_dataset(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, 1.0, 1.0];
        let hist = NodeHistogram::build(&thresholds, &[0, 1, 2, 3], &responses);

        assert!(find_best_split(&hist, &thresholds, 1, true).is_none());
        // Without the policy the zero-gain split is still returned.
        let split = find_best_split(&hist, &thresholds, 1, false).unwrap();
        assert_abs_diff_eq!(split.gain, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tie_break_prefers_first_feature() {
        // Two identical features; the candidate from feature 0 must win.
        let features =
            Array2::from_shape_vec((4, 2), vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]).unwrap();
        let ds = Dataset::new(features, Array1::zeros(4), vec![0, 4]).unwrap();
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, -1.0, -1.0];
        let hist = NodeHistogram::build(&thresholds, &[0, 1, 2, 3], &responses);

        let split = find_best_split(&hist, &thresholds, 1, false).unwrap();
        assert_eq!(split.feature, 0);
    }

    #[test]
    fn test_single_instance_node() {
        let ds = single_feature_dataset(vec![1.0, 2.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0];
        let hist = NodeHistogram::build(&thresholds, &[0], &responses);
        assert!(find_best_split(&hist, &thresholds, 1, false).is_none());
    }
}

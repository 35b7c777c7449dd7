//! Priority-queue driven tree growth.
//!
//! Growth runs a small state machine over frontier nodes: the frontier
//! lives in a max-heap keyed by node deviance, a popped node either
//! splits (children derive their histograms from the parent's and join
//! the frontier) or becomes a terminal leaf. The heap entry is a plain
//! value owning the node's transient instance list and histogram; it
//! never outlives growth.

use crate::config::TreeParams;
use crate::core::NodeIndex;
use crate::dataset::Dataset;
use crate::tree::histogram::{NodeHistogram, ThresholdSet};
use crate::tree::split::find_best_split;
use crate::tree::RegressionTree;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Frontier entry: a leaf awaiting its split attempt.
#[derive(Debug)]
struct Frontier {
    priority: f64,
    node: NodeIndex,
    instances: Vec<usize>,
    histogram: NodeHistogram,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            // Lower node index pops first on equal priority.
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Grows one regression tree per boosting iteration.
#[derive(Debug)]
pub struct TreeLearner<'a> {
    params: &'a TreeParams,
}

impl<'a> TreeLearner<'a> {
    /// Creates a learner over the given growth parameters.
    pub fn new(params: &'a TreeParams) -> Self {
        TreeLearner { params }
    }

    /// Fits a tree to the pseudoresponses of the given instances.
    ///
    /// When `weights` are supplied leaf outputs are weighted means,
    /// otherwise plain means of the assigned pseudoresponses.
    pub fn grow(
        &self,
        thresholds: &ThresholdSet,
        responses: &[f64],
        weights: Option<&[f64]>,
        instances: Vec<usize>,
    ) -> RegressionTree {
        let mut tree = RegressionTree::new(instances.len() as u32);
        if instances.is_empty() {
            tree.node_mut(0).set_leaf_stats(0.0, 0.0);
            return tree;
        }

        let root_histogram = NodeHistogram::build(thresholds, &instances, responses);
        let max_deviance = root_histogram.deviance();

        let mut heap = BinaryHeap::new();
        heap.push(Frontier {
            priority: max_deviance,
            node: 0,
            instances,
            histogram: root_histogram,
        });

        let leaf_cap = self.params.n_leaves;
        let mut n_leaves = 1;

        loop {
            if leaf_cap != 0 && n_leaves >= leaf_cap {
                break;
            }
            let Some(frontier) = heap.pop() else {
                break;
            };

            let candidate = find_best_split(
                &frontier.histogram,
                thresholds,
                self.params.min_leaf_support,
                self.params.require_deviance_improvement,
            );
            let Some(candidate) = candidate else {
                // No valid split: the node becomes a terminal leaf.
                self.finalize_leaf(&mut tree, frontier.node, &frontier.instances, responses, weights);
                continue;
            };

            let (left_node, right_node) = tree.split_node(frontier.node, &candidate);

            let (mut left_ids, mut right_ids) = (
                Vec::with_capacity(candidate.left_count as usize),
                Vec::with_capacity(candidate.right_count as usize),
            );
            for &i in &frontier.instances {
                if thresholds.bin(candidate.feature, i) <= candidate.bin {
                    left_ids.push(i);
                } else {
                    right_ids.push(i);
                }
            }

            // Scan the smaller child, derive the sibling by subtraction.
            let (left_hist, right_hist) = if left_ids.len() <= right_ids.len() {
                let scanned = NodeHistogram::build(thresholds, &left_ids, responses);
                let derived = NodeHistogram::complement(&frontier.histogram, &scanned);
                (scanned, derived)
            } else {
                let scanned = NodeHistogram::build(thresholds, &right_ids, responses);
                let derived = NodeHistogram::complement(&frontier.histogram, &scanned);
                (derived, scanned)
            };

            heap.push(Frontier {
                priority: left_hist.deviance(),
                node: left_node,
                instances: left_ids,
                histogram: left_hist,
            });
            heap.push(Frontier {
                priority: right_hist.deviance(),
                node: right_node,
                instances: right_ids,
                histogram: right_hist,
            });
            n_leaves += 1;
        }

        // Remaining frontier nodes failed to reach the queue before the
        // leaf cap; they terminate as leaves.
        for frontier in heap.into_vec() {
            self.finalize_leaf(&mut tree, frontier.node, &frontier.instances, responses, weights);
        }

        if self.params.collapse_factor > 0.0 {
            tree.collapse_leaves(self.params.collapse_factor, max_deviance);
        }
        tree
    }

    fn finalize_leaf(
        &self,
        tree: &mut RegressionTree,
        node: NodeIndex,
        instances: &[usize],
        responses: &[f64],
        weights: Option<&[f64]>,
    ) {
        let response_sum: f64 = instances.iter().map(|&i| responses[i]).sum();
        let weight_sum = match weights {
            Some(w) => instances.iter().map(|&i| w[i]).sum(),
            None => instances.len() as f64,
        };
        tree.node_mut(node).set_leaf_stats(response_sum, weight_sum);
    }
}

/// Convenience wrapper fitting a tree on a dataset's full instance range.
pub fn fit_tree(
    params: &TreeParams,
    dataset: &Dataset,
    thresholds: &ThresholdSet,
    responses: &[f64],
    weights: Option<&[f64]>,
) -> RegressionTree {
    let instances: Vec<usize> = (0..dataset.num_instances()).collect();
    TreeLearner::new(params).grow(thresholds, responses, weights, instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn dataset(values: Vec<f32>) -> Dataset {
        let n = values.len();
        let features = Array2::from_shape_vec((n, 1), values).unwrap();
        Dataset::new(features, Array1::zeros(n), vec![0, n]).unwrap()
    }

    #[test]
    fn test_two_leaf_tree_recovers_signs() {
        // Responses +1 +1 -1 -1 over values 1..4 with a two-leaf cap:
        // the split lands between 2 and 3 and the leaves output +1/-1.
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 1.0, -1.0, -1.0];
        let params = TreeParams {
            n_leaves: 2,
            min_leaf_support: 1,
            ..TreeParams::default()
        };
        let tree = fit_tree(&params, &ds, &thresholds, &responses, None);

        assert_eq!(tree.num_leaves(), 2);
        assert_abs_diff_eq!(tree.predict(&ds, 0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict(&ds, 1), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict(&ds, 2), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict(&ds, 3), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unlimited_leaves_bounded_by_support() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        let params = TreeParams {
            n_leaves: 0,
            min_leaf_support: 2,
            ..TreeParams::default()
        };
        let tree = fit_tree(&params, &ds, &thresholds, &responses, None);

        // No leaf may hold fewer than two instances.
        for index in 0..tree.num_nodes() {
            let node = tree.node(index);
            if node.is_leaf() && node.is_active() {
                assert!(node.count() >= 2);
            }
        }
        assert_eq!(tree.num_leaves(), 4);
    }

    #[test]
    fn test_weighted_leaf_outputs() {
        let ds = dataset(vec![1.0, 2.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![3.0, 0.0];
        let weights = vec![2.0, 1.0];
        let params = TreeParams {
            n_leaves: 1,
            min_leaf_support: 1,
            ..TreeParams::default()
        };
        let tree = fit_tree(&params, &ds, &thresholds, &responses, Some(&weights));
        // Single leaf: output = (3 + 0) / (2 + 1).
        assert_abs_diff_eq!(tree.predict(&ds, 0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_responses_make_single_leaf() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![2.5; 4];
        let params = TreeParams {
            n_leaves: 0,
            min_leaf_support: 1,
            require_deviance_improvement: true,
            ..TreeParams::default()
        };
        let tree = fit_tree(&params, &ds, &thresholds, &responses, None);
        assert_eq!(tree.num_leaves(), 1);
        assert_abs_diff_eq!(tree.predict(&ds, 2), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_collapse_pass_shrinks_tree() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        // One dominant split, then only noise.
        let responses = vec![1.0, 1.01, 1.0, 1.02, -1.0, -1.01, -1.0, -1.02];
        let loose = TreeParams {
            n_leaves: 0,
            min_leaf_support: 1,
            collapse_factor: 0.0,
            ..TreeParams::default()
        };
        let full = fit_tree(&loose, &ds, &thresholds, &responses, None);

        let collapsing = TreeParams {
            collapse_factor: 0.5,
            ..loose
        };
        let collapsed = fit_tree(&collapsing, &ds, &thresholds, &responses, None);
        assert!(collapsed.num_leaves() < full.num_leaves());
        // The dominant split survives the collapse pass.
        assert!(collapsed.predict(&ds, 0) > 0.0);
        assert!(collapsed.predict(&ds, 7) < 0.0);
    }

    #[test]
    fn test_empty_sample() {
        let ds = dataset(vec![1.0, 2.0]);
        let thresholds = ThresholdSet::new(&ds, 0);
        let responses = vec![1.0, 2.0];
        let params = TreeParams::default();
        let tree = TreeLearner::new(&params).grow(&thresholds, &responses, None, Vec::new());
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.predict(&ds, 0), 0.0);
    }
}

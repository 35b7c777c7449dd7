//! Regression trees and the histogram-driven growth machinery.

pub mod histogram;
pub mod learner;
pub mod node;
pub mod split;

pub use histogram::{Bin, NodeHistogram, ThresholdSet};
pub use learner::TreeLearner;
pub use node::TreeNode;
pub use split::{find_best_split, SplitCandidate};

use crate::core::{NodeIndex, Score};
use crate::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// A single regression tree over an arena of index-linked nodes.
///
/// Index 0 is always the root. The tree owns its entire node set;
/// collapsed nodes stay in the arena marked inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_leaves: usize,
}

impl RegressionTree {
    /// Creates a tree consisting of a single root leaf.
    pub(crate) fn new(root_count: u32) -> Self {
        RegressionTree {
            nodes: vec![TreeNode::new_leaf(None, 0, root_count)],
            n_leaves: 1,
        }
    }

    /// Number of nodes in the arena, inactive ones included.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of active leaves.
    pub fn num_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Returns the node at `index`.
    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut TreeNode {
        &mut self.nodes[index]
    }

    /// Splits the leaf at `node_index`, appending two child leaves to the
    /// arena. Returns the child indices.
    pub(crate) fn split_node(
        &mut self,
        node_index: NodeIndex,
        candidate: &SplitCandidate,
    ) -> (NodeIndex, NodeIndex) {
        let depth = self.nodes[node_index].depth() + 1;
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(TreeNode::new_leaf(
            Some(node_index),
            depth,
            candidate.left_count,
        ));
        self.nodes.push(TreeNode::new_leaf(
            Some(node_index),
            depth,
            candidate.right_count,
        ));
        self.nodes[node_index].set_split(
            left,
            right,
            candidate.feature,
            candidate.threshold,
            candidate.gain,
        );
        // One leaf replaced by two.
        self.n_leaves += 1;
        (left, right)
    }

    /// Routes an instance from the root to a leaf and returns the leaf
    /// output.
    pub fn predict(&self, dataset: &Dataset, instance: usize) -> Score {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.output();
            }
            let feature = node.split_feature().unwrap_or(0);
            let threshold = node.split_threshold().unwrap_or(0.0);
            index = if dataset.get(instance, feature) <= threshold {
                node.left_child().unwrap_or(index)
            } else {
                node.right_child().unwrap_or(index)
            };
        }
    }

    /// Collapses sibling leaf pairs whose split gain falls below
    /// `collapse_factor * max_deviance`, repeating until stable. Returns
    /// the number of collapsed pairs.
    pub(crate) fn collapse_leaves(&mut self, collapse_factor: f64, max_deviance: f64) -> usize {
        let cutoff = collapse_factor * max_deviance;
        let mut collapsed = 0;
        loop {
            let mut changed = false;
            for index in (0..self.nodes.len()).rev() {
                let node = &self.nodes[index];
                if node.is_leaf() || !node.is_active() {
                    continue;
                }
                let (left, right) = (
                    node.left_child().expect("internal node has left child"),
                    node.right_child().expect("internal node has right child"),
                );
                if !self.nodes[left].is_leaf() || !self.nodes[right].is_leaf() {
                    continue;
                }
                if node.split_gain() >= cutoff {
                    continue;
                }
                let response_sum =
                    self.nodes[left].response_sum() + self.nodes[right].response_sum();
                let weight_sum = self.nodes[left].weight_sum() + self.nodes[right].weight_sum();
                self.nodes[left].deactivate();
                self.nodes[right].deactivate();
                self.nodes[index].collapse_into_leaf(response_sum, weight_sum);
                self.n_leaves -= 1;
                collapsed += 1;
                changed = true;
            }
            if !changed {
                return collapsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset() -> Dataset {
        let features = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        Dataset::new(features, Array1::zeros(4), vec![0, 4]).unwrap()
    }

    fn candidate() -> SplitCandidate {
        SplitCandidate {
            feature: 0,
            bin: 1,
            threshold: 2.0,
            gain: 4.0,
            left_sum: 2.0,
            left_count: 2,
            right_sum: -2.0,
            right_count: 2,
        }
    }

    #[test]
    fn test_split_and_predict() {
        let mut tree = RegressionTree::new(4);
        let (left, right) = tree.split_node(0, &candidate());
        tree.node_mut(left).set_leaf_stats(2.0, 2.0);
        tree.node_mut(right).set_leaf_stats(-2.0, 2.0);

        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.num_leaves(), 2);
        let ds = dataset();
        assert_eq!(tree.predict(&ds, 0), 1.0);
        assert_eq!(tree.predict(&ds, 1), 1.0);
        assert_eq!(tree.predict(&ds, 2), -1.0);
        assert_eq!(tree.predict(&ds, 3), -1.0);
    }

    #[test]
    fn test_parent_links() {
        let mut tree = RegressionTree::new(4);
        let (left, right) = tree.split_node(0, &candidate());
        assert_eq!(tree.node(left).parent(), Some(0));
        assert_eq!(tree.node(right).parent(), Some(0));
        assert_eq!(tree.node(left).depth(), 1);
        assert_eq!(tree.node(0).parent(), None);
    }

    #[test]
    fn test_collapse_low_gain_pair() {
        let mut tree = RegressionTree::new(4);
        let (left, right) = tree.split_node(0, &candidate());
        tree.node_mut(left).set_leaf_stats(2.0, 2.0);
        tree.node_mut(right).set_leaf_stats(-2.0, 2.0);

        // Cutoff far above the recorded gain: the pair collapses.
        let collapsed = tree.collapse_leaves(10.0, 1.0);
        assert_eq!(collapsed, 1);
        assert_eq!(tree.num_leaves(), 1);
        assert!(tree.node(0).is_leaf());
        assert!(!tree.node(left).is_active());
        assert!(!tree.node(right).is_active());
        let ds = dataset();
        assert_eq!(tree.predict(&ds, 0), 0.0);
    }

    #[test]
    fn test_collapse_keeps_high_gain_pair() {
        let mut tree = RegressionTree::new(4);
        let (left, right) = tree.split_node(0, &candidate());
        tree.node_mut(left).set_leaf_stats(2.0, 2.0);
        tree.node_mut(right).set_leaf_stats(-2.0, 2.0);

        let collapsed = tree.collapse_leaves(0.1, 1.0);
        assert_eq!(collapsed, 0);
        assert_eq!(tree.num_leaves(), 2);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut tree = RegressionTree::new(4);
        let (left, right) = tree.split_node(0, &candidate());
        tree.node_mut(left).set_leaf_stats(2.0, 2.0);
        tree.node_mut(right).set_leaf_stats(-2.0, 2.0);

        let encoded = serde_json::to_string(&tree).unwrap();
        let decoded: RegressionTree = serde_json::from_str(&encoded).unwrap();
        let ds = dataset();
        for i in 0..4 {
            assert_eq!(tree.predict(&ds, i), decoded.predict(&ds, i));
        }
    }
}

//! Arena-allocated regression tree nodes.
//!
//! Nodes live in a per-tree arena and reference each other by index.
//! Leaf collapsing marks nodes inactive instead of freeing them, so no
//! parent or child link can ever dangle.

use crate::core::{Feature, FeatureIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Tree node, either a leaf or an internal split node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    parent: Option<NodeIndex>,
    left_child: Option<NodeIndex>,
    right_child: Option<NodeIndex>,
    split_feature: Option<FeatureIndex>,
    split_threshold: Option<Feature>,
    split_gain: f64,
    /// Prediction value; meaningful for leaves only.
    output: f64,
    /// Pseudoresponse sum of the assigned instances, retained so that
    /// collapsed parents can recompute their output without the
    /// instance lists.
    response_sum: f64,
    /// Weight sum of the assigned instances (instance count when no
    /// weights are supplied).
    weight_sum: f64,
    /// Number of assigned instances.
    count: u32,
    depth: usize,
    is_leaf: bool,
    active: bool,
}

impl TreeNode {
    /// Creates a new leaf node.
    pub fn new_leaf(parent: Option<NodeIndex>, depth: usize, count: u32) -> Self {
        TreeNode {
            parent,
            left_child: None,
            right_child: None,
            split_feature: None,
            split_threshold: None,
            split_gain: 0.0,
            output: 0.0,
            response_sum: 0.0,
            weight_sum: 0.0,
            count,
            depth,
            is_leaf: true,
            active: true,
        }
    }

    /// Returns true if this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Returns true if this node has not been collapsed away.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Parent node index (`None` for the root).
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Left child index (internal nodes only).
    pub fn left_child(&self) -> Option<NodeIndex> {
        self.left_child
    }

    /// Right child index (internal nodes only).
    pub fn right_child(&self) -> Option<NodeIndex> {
        self.right_child
    }

    /// Split feature (internal nodes only).
    pub fn split_feature(&self) -> Option<FeatureIndex> {
        self.split_feature
    }

    /// Split threshold (internal nodes only).
    pub fn split_threshold(&self) -> Option<Feature> {
        self.split_threshold
    }

    /// Deviance reduction recorded when this node was split.
    pub fn split_gain(&self) -> f64 {
        self.split_gain
    }

    /// Leaf output value.
    pub fn output(&self) -> f64 {
        self.output
    }

    /// Number of instances assigned during growth.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Depth of the node, 0 for the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn response_sum(&self) -> f64 {
        self.response_sum
    }

    pub(crate) fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    /// Converts this leaf into an internal node.
    pub(crate) fn set_split(
        &mut self,
        left_child: NodeIndex,
        right_child: NodeIndex,
        feature: FeatureIndex,
        threshold: Feature,
        gain: f64,
    ) {
        self.left_child = Some(left_child);
        self.right_child = Some(right_child);
        self.split_feature = Some(feature);
        self.split_threshold = Some(threshold);
        self.split_gain = gain;
        self.is_leaf = false;
    }

    /// Records the aggregated leaf statistics and the resulting output.
    pub(crate) fn set_leaf_stats(&mut self, response_sum: f64, weight_sum: f64) {
        self.response_sum = response_sum;
        self.weight_sum = weight_sum;
        self.output = if weight_sum > 0.0 {
            response_sum / weight_sum
        } else {
            0.0
        };
    }

    /// Reverts an internal node to a leaf, absorbing its children's
    /// statistics. The children are marked inactive by the caller.
    pub(crate) fn collapse_into_leaf(&mut self, response_sum: f64, weight_sum: f64) {
        self.left_child = None;
        self.right_child = None;
        self.split_feature = None;
        self.split_threshold = None;
        self.split_gain = 0.0;
        self.is_leaf = true;
        self.set_leaf_stats(response_sum, weight_sum);
    }

    /// Marks the node as removed from the tree.
    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_leaf() {
        let node = TreeNode::new_leaf(Some(0), 2, 10);
        assert!(node.is_leaf());
        assert!(node.is_active());
        assert_eq!(node.parent(), Some(0));
        assert_eq!(node.depth(), 2);
        assert_eq!(node.count(), 10);
        assert!(node.left_child().is_none());
    }

    #[test]
    fn test_set_split() {
        let mut node = TreeNode::new_leaf(None, 0, 4);
        node.set_split(1, 2, 3, 0.5, 1.25);
        assert!(!node.is_leaf());
        assert_eq!(node.left_child(), Some(1));
        assert_eq!(node.right_child(), Some(2));
        assert_eq!(node.split_feature(), Some(3));
        assert_eq!(node.split_threshold(), Some(0.5));
        assert_eq!(node.split_gain(), 1.25);
    }

    #[test]
    fn test_leaf_output_is_weighted_mean() {
        let mut node = TreeNode::new_leaf(None, 0, 3);
        node.set_leaf_stats(6.0, 3.0);
        assert_eq!(node.output(), 2.0);

        node.set_leaf_stats(1.0, 0.0);
        assert_eq!(node.output(), 0.0);
    }

    #[test]
    fn test_collapse_restores_leaf() {
        let mut node = TreeNode::new_leaf(None, 0, 4);
        node.set_split(1, 2, 0, 1.0, 2.0);
        node.collapse_into_leaf(4.0, 4.0);
        assert!(node.is_leaf());
        assert!(node.left_child().is_none());
        assert_eq!(node.output(), 1.0);
    }
}

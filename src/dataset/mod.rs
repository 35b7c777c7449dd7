//! Dataset container for the rankforest training engine.
//!
//! Instances are grouped into contiguous query blocks via an offset
//! table. The feature block can be held in row-major or column-major
//! memory order with an explicit physical conversion between the two;
//! accessor semantics are layout independent.

use crate::core::{Feature, Label, RankForestError, Result};
use ndarray::{Array1, Array2};
use std::collections::BTreeSet;

/// Memory order of the feature block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Instances are contiguous (one row per instance).
    RowMajor,
    /// Features are contiguous (one column per feature).
    ColMajor,
}

/// Instances x features matrix with labels and query grouping.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<Feature>,
    layout: Layout,
    labels: Array1<Label>,
    query_offsets: Vec<usize>,
}

impl Dataset {
    /// Creates a dataset from an instances x features block, labels and a
    /// query offset table (`query_offsets[q]..query_offsets[q + 1]` is the
    /// contiguous instance range of query `q`).
    pub fn new(
        features: Array2<Feature>,
        labels: Array1<Label>,
        query_offsets: Vec<usize>,
    ) -> Result<Self> {
        let n_instances = features.nrows();
        if labels.len() != n_instances {
            return Err(RankForestError::dataset(format!(
                "label count {} does not match instance count {}",
                labels.len(),
                n_instances
            )));
        }
        if query_offsets.len() < 2
            || query_offsets[0] != 0
            || *query_offsets.last().unwrap() != n_instances
        {
            return Err(RankForestError::dataset(
                "query offsets must start at 0 and end at the instance count",
            ));
        }
        if query_offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RankForestError::dataset(
                "query offsets must be strictly increasing",
            ));
        }
        Ok(Dataset {
            features,
            layout: Layout::RowMajor,
            labels,
            query_offsets,
        })
    }

    /// Number of instances.
    pub fn num_instances(&self) -> usize {
        self.features.nrows()
    }

    /// Number of features.
    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of queries.
    pub fn num_queries(&self) -> usize {
        self.query_offsets.len() - 1
    }

    /// Current memory order of the feature block.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Feature value of `instance` at `feature`.
    #[inline]
    pub fn get(&self, instance: usize, feature: usize) -> Feature {
        self.features[[instance, feature]]
    }

    /// Label of `instance`.
    #[inline]
    pub fn label(&self, instance: usize) -> Label {
        self.labels[instance]
    }

    /// All labels.
    pub fn labels(&self) -> &Array1<Label> {
        &self.labels
    }

    /// The query offset table.
    pub fn query_offsets(&self) -> &[usize] {
        &self.query_offsets
    }

    /// Instance range of query `q`.
    pub fn query_bounds(&self, q: usize) -> (usize, usize) {
        (self.query_offsets[q], self.query_offsets[q + 1])
    }

    /// One feature column, copied out in instance order.
    pub fn feature_column(&self, feature: usize) -> Vec<Feature> {
        self.features.column(feature).to_vec()
    }

    /// Physically converts the feature block to the other memory order.
    ///
    /// Logical indexing is unchanged; only the underlying storage order
    /// flips, which matters for per-feature scan locality.
    pub fn transpose(&mut self) {
        let flipped = self
            .features
            .t()
            .as_standard_layout()
            .into_owned()
            .reversed_axes();
        self.features = flipped;
        self.layout = match self.layout {
            Layout::RowMajor => Layout::ColMajor,
            Layout::ColMajor => Layout::RowMajor,
        };
    }

    /// Returns a copy with the given feature columns physically removed.
    ///
    /// Labels and query grouping are preserved; the surviving columns
    /// keep their relative order. The copy is row-major.
    pub fn filter_features(&self, pruned: &BTreeSet<usize>) -> Result<Self> {
        let kept: Vec<usize> = (0..self.num_features())
            .filter(|f| !pruned.contains(f))
            .collect();
        if kept.is_empty() {
            return Err(RankForestError::dataset(
                "cannot filter out every feature",
            ));
        }
        let mut filtered = Array2::zeros((self.num_instances(), kept.len()));
        for (new_f, &old_f) in kept.iter().enumerate() {
            for i in 0..self.num_instances() {
                filtered[[i, new_f]] = self.get(i, old_f);
            }
        }
        Ok(Dataset {
            features: filtered,
            layout: Layout::RowMajor,
            labels: self.labels.clone(),
            query_offsets: self.query_offsets.clone(),
        })
    }
}

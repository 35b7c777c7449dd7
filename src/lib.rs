//! # rankforest
//!
//! A gradient-boosted regression-tree ensemble training engine for
//! learning-to-rank: histogram-accelerated tree growth, weighted
//! ensemble management with incremental scoring, dropout (DART)
//! regularization and post-hoc ensemble pruning with joint weight
//! re-optimization.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rankforest::{Booster, BoostingParams, Dataset, Ndcg};
//! use ndarray::{Array1, Array2};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Two queries of two instances each.
//! let features = Array2::from_shape_vec((4, 2), vec![
//!     1.0, 2.0,
//!     2.0, 3.0,
//!     3.0, 4.0,
//!     4.0, 5.0,
//! ])?;
//! let labels = Array1::from_vec(vec![1.0, 0.0, 2.0, 0.0]);
//! let dataset = Dataset::new(features, labels, vec![0, 2, 4])?;
//!
//! let mut booster = Booster::new(BoostingParams {
//!     n_trees: 100,
//!     shrinkage: 0.1,
//!     ..BoostingParams::default()
//! })?;
//! let report = booster.fit(&dataset, None, &Ndcg::new(10), None)?;
//! println!("trained {} trees", report.trees);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: scalar types, the crate error type, the seeded generator
//! - [`config`]: hyperparameters with fail-fast validation
//! - [`dataset`]: feature/label/query accessor with layout conversion
//! - [`metrics`]: metric collaborator trait plus reference metrics
//! - [`tree`]: histograms, split search and best-first tree growth
//! - [`ensemble`]: weighted tree collection with incremental scoring
//! - [`boosting`]: the training driver and its plain/stratified/DART
//!   variants
//! - [`pruning`]: post-hoc member selection and line-search reweighting
//! - [`io`]: snapshots and the persistence collaborator contract

#![warn(missing_docs)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod boosting;
pub mod config;
pub mod core;
pub mod dataset;
pub mod ensemble;
pub mod io;
pub mod metrics;
pub mod pruning;
pub mod tree;

pub use crate::boosting::{Booster, TrainingReport};
pub use crate::config::{
    AdaptiveStrategy, BoostingParams, DartNormalization, DartParams, DartSampling,
    LineSearchParams, NegativeStrategy, PruningMethod, PruningParams, SelectiveParams, TreeParams,
};
pub use crate::core::{Random, RankForestError, Result};
pub use crate::dataset::{Dataset, Layout};
pub use crate::ensemble::{Ensemble, ScoreUpdate, TreeEntry};
pub use crate::io::{snapshot, EnsembleSnapshot, JsonSnapshotStore, SnapshotInfo, SnapshotStore};
pub use crate::metrics::{Metric, Ndcg, PointwiseRmse};
pub use crate::pruning::{EnsemblePruning, LineSearch};
pub use crate::tree::RegressionTree;

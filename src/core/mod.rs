//! Core infrastructure for the rankforest training engine.
//!
//! Shared scalar type aliases, the crate error type and the seeded random
//! generator every training run is handed.

pub mod error;
pub mod random;
pub mod types;

pub use error::{RankForestError, Result};
pub use random::Random;
pub use types::{BinIndex, Feature, FeatureIndex, Label, MetricScore, NodeIndex, Score};

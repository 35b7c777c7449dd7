//! Core data types shared across the rankforest training engine.
//!
//! These aliases pin down the numeric widths used throughout training so
//! that histogram accumulation, score maintenance and metric evaluation
//! agree on precision everywhere.

/// Raw feature value type. 32-bit float, matching the width ranking
/// datasets are typically distributed in.
pub type Feature = f32;

/// Relevance label type.
pub type Label = f32;

/// Running model score type. 64-bit to keep incremental add/subtract
/// score maintenance numerically stable over long trainings.
pub type Score = f64;

/// Metric evaluation result type.
pub type MetricScore = f64;

/// Tree node identifier inside a tree's node arena.
pub type NodeIndex = usize;

/// Feature index into the dataset's feature axis.
pub type FeatureIndex = usize;

/// Threshold index into a feature's discretized threshold array.
pub type BinIndex = usize;

//! Hyperparameter configuration for the rankforest training engine.
//!
//! Every strategy knob is a typed enum that parses from its string
//! identifier; an unknown identifier is a configuration error raised
//! before any training work starts. Config structs carry `validate()`
//! methods that fail fast with a descriptive message and mutate nothing.

use crate::core::{RankForestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tree growth parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum number of leaves per tree. 0 means unlimited, bounded only
    /// by `min_leaf_support`.
    pub n_leaves: usize,
    /// Minimum number of instances required in each leaf.
    pub min_leaf_support: usize,
    /// Maximum number of discretization thresholds per feature. 0 means
    /// one threshold per distinct value.
    pub n_thresholds: usize,
    /// Collapse sibling leaf pairs whose split gain falls below this
    /// fraction of the root deviance. 0 disables the collapse pass.
    pub collapse_factor: f64,
    /// Reject splits whose best gain does not strictly improve on the
    /// parent deviance.
    pub require_deviance_improvement: bool,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            n_leaves: 10,
            min_leaf_support: 1,
            n_thresholds: 0,
            collapse_factor: 0.0,
            require_deviance_improvement: false,
        }
    }
}

impl TreeParams {
    /// Validates tree growth parameters.
    pub fn validate(&self) -> Result<()> {
        if self.min_leaf_support == 0 {
            return Err(RankForestError::config("min_leaf_support must be positive"));
        }
        if !self.collapse_factor.is_finite() || self.collapse_factor < 0.0 {
            return Err(RankForestError::config(
                "collapse_factor must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Boosting loop parameters shared by all training variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Maximum number of trees in the ensemble.
    pub n_trees: usize,
    /// Shrinkage (learning rate) applied to each newly added tree.
    pub shrinkage: f64,
    /// Stop after this many rounds without improvement over the best
    /// validation metric. 0 disables early stopping.
    pub early_stopping_rounds: usize,
    /// Uniform subsampling of the active instance set each iteration.
    /// A value below 1 is a fraction, above 1 an absolute count, exactly
    /// 1 disables subsampling.
    pub subsample: f64,
    /// Offer a snapshot to the persistence collaborator every this many
    /// completed trees. 0 disables checkpointing.
    pub checkpoint_every: usize,
    /// Seed for the run's random generator.
    pub seed: u64,
    /// Tree growth parameters.
    pub tree: TreeParams,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            n_trees: 100,
            shrinkage: 0.1,
            early_stopping_rounds: 100,
            subsample: 1.0,
            checkpoint_every: 0,
            seed: 0,
            tree: TreeParams::default(),
        }
    }
}

impl BoostingParams {
    /// Validates boosting parameters, including the nested tree params.
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(RankForestError::config("n_trees must be positive"));
        }
        if !self.shrinkage.is_finite() || self.shrinkage <= 0.0 {
            return Err(RankForestError::config("shrinkage must be positive"));
        }
        if !self.subsample.is_finite() || self.subsample <= 0.0 {
            return Err(RankForestError::config("subsample must be positive"));
        }
        self.tree.validate()
    }
}

/// Dropout set selection strategy for DART training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DartSampling {
    /// Uniform random subset of the ensemble.
    Uniform,
    /// Weight-proportional sampling.
    Weighted,
    /// Inverted weight-proportional sampling.
    WeightedInv,
    /// Uniform subset restricted to the first half of the ensemble.
    TopHalf,
    /// Uniform sampling with permanent removal after 2 drops.
    Count2,
    /// Uniform sampling with permanent removal after 3 drops.
    Count3,
    /// Like `Count2`, redistributing the freed weight among survivors.
    Count2N,
    /// Like `Count3`, redistributing the freed weight among survivors.
    Count3N,
}

impl DartSampling {
    /// Permanent-removal drop count threshold, for the count-based types.
    pub fn count_threshold(self) -> Option<u32> {
        match self {
            DartSampling::Count2 | DartSampling::Count2N => Some(2),
            DartSampling::Count3 | DartSampling::Count3N => Some(3),
            _ => None,
        }
    }

    /// Whether this is a count-based type that redistributes freed weight.
    pub fn redistributes_freed_weight(self) -> bool {
        matches!(self, DartSampling::Count2N | DartSampling::Count3N)
    }
}

impl fmt::Display for DartSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DartSampling::Uniform => "uniform",
            DartSampling::Weighted => "weighted",
            DartSampling::WeightedInv => "weighted_inv",
            DartSampling::TopHalf => "top_half",
            DartSampling::Count2 => "count2",
            DartSampling::Count3 => "count3",
            DartSampling::Count2N => "count2n",
            DartSampling::Count3N => "count3n",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DartSampling {
    type Err = RankForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(DartSampling::Uniform),
            "weighted" => Ok(DartSampling::Weighted),
            "weighted_inv" => Ok(DartSampling::WeightedInv),
            "top_half" => Ok(DartSampling::TopHalf),
            "count2" => Ok(DartSampling::Count2),
            "count3" => Ok(DartSampling::Count3),
            "count2n" => Ok(DartSampling::Count2N),
            "count3n" => Ok(DartSampling::Count3N),
            other => Err(RankForestError::config(format!(
                "unknown dropout sampling type: {}",
                other
            ))),
        }
    }
}

/// Weight renormalization strategy applied when a dropout is not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DartNormalization {
    /// Scale the new tree and the dropped trees by tree counts.
    Tree,
    /// No renormalization; the new tree keeps the shrinkage weight.
    None,
    /// Scale by the total weight of the dropped trees.
    Weighted,
    /// Analytic forest-level blend.
    Forest,
    /// Like `Tree` but the new tree is pushed with the scaled weight.
    TreeAdaptive,
    /// Like `Tree` with a fixed boost factor of 3.
    TreeBoost3,
    /// Bounded 1-D search over candidate weights for the new tree.
    LineSearch,
}

impl fmt::Display for DartNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DartNormalization::Tree => "tree",
            DartNormalization::None => "none",
            DartNormalization::Weighted => "weighted",
            DartNormalization::Forest => "forest",
            DartNormalization::TreeAdaptive => "tree_adaptive",
            DartNormalization::TreeBoost3 => "tree_boost3",
            DartNormalization::LineSearch => "line_search",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DartNormalization {
    type Err = RankForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(DartNormalization::Tree),
            "none" => Ok(DartNormalization::None),
            "weighted" => Ok(DartNormalization::Weighted),
            "forest" => Ok(DartNormalization::Forest),
            "tree_adaptive" => Ok(DartNormalization::TreeAdaptive),
            "tree_boost3" => Ok(DartNormalization::TreeBoost3),
            "line_search" => Ok(DartNormalization::LineSearch),
            other => Err(RankForestError::config(format!(
                "unknown dropout normalization type: {}",
                other
            ))),
        }
    }
}

/// DART overlay parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DartParams {
    /// Dropout set selection strategy.
    pub sample_type: DartSampling,
    /// Weight renormalization strategy.
    pub normalize_type: DartNormalization,
    /// Number of trees to drop per iteration. A value below 1 is a
    /// fraction of the ensemble size, 1 or above an absolute count.
    pub rate_drop: f64,
    /// Probability of skipping dropout entirely for an iteration.
    pub skip_drop: f64,
    /// Retain a dropout permanently when the post-fit evaluation beats
    /// the previous accepted metric. Forced off for count-based samplers.
    pub keep_drop: bool,
}

impl Default for DartParams {
    fn default() -> Self {
        DartParams {
            sample_type: DartSampling::Uniform,
            normalize_type: DartNormalization::Tree,
            rate_drop: 0.1,
            skip_drop: 0.0,
            keep_drop: false,
        }
    }
}

impl DartParams {
    /// Validates DART parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.rate_drop.is_finite() || self.rate_drop < 0.0 {
            return Err(RankForestError::config(
                "rate_drop must be finite and non-negative",
            ));
        }
        if !self.skip_drop.is_finite() || !(0.0..=1.0).contains(&self.skip_drop) {
            return Err(RankForestError::config("skip_drop must be in [0, 1]"));
        }
        Ok(())
    }
}

/// How the rank/random negative mix reacts to recent metric improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveStrategy {
    /// Keep the configured factors unchanged.
    None,
    /// Blend both factors between the configured min and max.
    Fixed,
    /// Split the factor sum by the improvement ratio.
    Ratio,
    /// Blend the sum, then split it by the improvement ratio.
    Mix,
}

impl FromStr for AdaptiveStrategy {
    type Err = RankForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(AdaptiveStrategy::None),
            "fixed" => Ok(AdaptiveStrategy::Fixed),
            "ratio" => Ok(AdaptiveStrategy::Ratio),
            "mix" => Ok(AdaptiveStrategy::Mix),
            other => Err(RankForestError::config(format!(
                "unknown adaptive strategy: {}",
                other
            ))),
        }
    }
}

/// How per-query negative budgets are derived from the factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegativeStrategy {
    /// Budgets are fractions of the query's negative pool.
    Ratio,
    /// Budgets are multiples of the query's positive count.
    Mul,
    /// Budgets are fractions of the negatives ranked above the lowest
    /// positive.
    Pos,
}

impl FromStr for NegativeStrategy {
    type Err = RankForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ratio" => Ok(NegativeStrategy::Ratio),
            "mul" => Ok(NegativeStrategy::Mul),
            "pos" => Ok(NegativeStrategy::Pos),
            other => Err(RankForestError::config(format!(
                "unknown negative strategy: {}",
                other
            ))),
        }
    }
}

/// Stratified sampling parameters for the selective boosting variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectiveParams {
    /// Re-select the active sample every this many iterations.
    pub sampling_iterations: usize,
    /// Budget factor for rank-ordered "hard" negatives.
    pub rank_sampling_factor: f64,
    /// Budget factor for uniformly random negatives.
    pub random_sampling_factor: f64,
    /// Adaptive mixing strategy.
    pub adaptive_strategy: AdaptiveStrategy,
    /// Per-query negative budget strategy.
    pub negative_strategy: NegativeStrategy,
    /// Sliding window length for the improvement ratio.
    pub improvement_window: usize,
}

impl Default for SelectiveParams {
    fn default() -> Self {
        SelectiveParams {
            sampling_iterations: 10,
            rank_sampling_factor: 0.3,
            random_sampling_factor: 0.3,
            adaptive_strategy: AdaptiveStrategy::None,
            negative_strategy: NegativeStrategy::Ratio,
            improvement_window: 20,
        }
    }
}

impl SelectiveParams {
    /// Validates stratified sampling parameters.
    pub fn validate(&self) -> Result<()> {
        if self.sampling_iterations == 0 {
            return Err(RankForestError::config(
                "sampling_iterations must be positive",
            ));
        }
        if self.rank_sampling_factor < 0.0 || self.random_sampling_factor < 0.0 {
            return Err(RankForestError::config(
                "sampling factors must be non-negative",
            ));
        }
        if self.adaptive_strategy != AdaptiveStrategy::None && self.improvement_window == 0 {
            return Err(RankForestError::config(
                "improvement_window must be positive for adaptive strategies",
            ));
        }
        Ok(())
    }
}

/// Per-member coordinate line search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSearchParams {
    /// Number of candidate points evaluated per window.
    pub num_points: usize,
    /// Initial half-width of the candidate window around each weight.
    pub window_size: f64,
    /// Multiplier applied to the window after each full sweep.
    pub reduction_factor: f64,
    /// Maximum number of sweeps over all members.
    pub max_iterations: usize,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        LineSearchParams {
            num_points: 20,
            window_size: 1.0,
            reduction_factor: 0.95,
            max_iterations: 10,
        }
    }
}

impl LineSearchParams {
    /// Validates line search parameters.
    pub fn validate(&self) -> Result<()> {
        if self.num_points == 0 {
            return Err(RankForestError::config("num_points must be positive"));
        }
        if !self.window_size.is_finite() || self.window_size <= 0.0 {
            return Err(RankForestError::config("window_size must be positive"));
        }
        if !self.reduction_factor.is_finite()
            || self.reduction_factor <= 0.0
            || self.reduction_factor > 1.0
        {
            return Err(RankForestError::config(
                "reduction_factor must be in (0, 1]",
            ));
        }
        if self.max_iterations == 0 {
            return Err(RankForestError::config("max_iterations must be positive"));
        }
        Ok(())
    }
}

/// Member selection strategy for post-hoc ensemble pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PruningMethod {
    /// Uniform sample without replacement.
    Random,
    /// Drop the smallest-magnitude weights.
    LowWeights,
    /// Drop the most recently added members.
    Last,
    /// Keep an evenly spaced subset.
    Skip,
    /// Drop the members whose simulated removal hurts the metric least.
    QualityLoss,
    /// Drop the smallest total weighted contributors to the output score.
    ScoreLoss,
}

impl PruningMethod {
    /// Whether this method needs line-search weights before selection.
    pub fn requires_line_search(self) -> bool {
        matches!(
            self,
            PruningMethod::LowWeights | PruningMethod::QualityLoss | PruningMethod::ScoreLoss
        )
    }
}

impl fmt::Display for PruningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PruningMethod::Random => "random",
            PruningMethod::LowWeights => "low_weights",
            PruningMethod::Last => "last",
            PruningMethod::Skip => "skip",
            PruningMethod::QualityLoss => "quality_loss",
            PruningMethod::ScoreLoss => "score_loss",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PruningMethod {
    type Err = RankForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(PruningMethod::Random),
            "low_weights" => Ok(PruningMethod::LowWeights),
            "last" => Ok(PruningMethod::Last),
            "skip" => Ok(PruningMethod::Skip),
            "quality_loss" => Ok(PruningMethod::QualityLoss),
            "score_loss" => Ok(PruningMethod::ScoreLoss),
            other => Err(RankForestError::config(format!(
                "unknown pruning method: {}",
                other
            ))),
        }
    }
}

/// Ensemble pruning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningParams {
    /// Member selection strategy.
    pub method: PruningMethod,
    /// Number of members to prune. A value below 1 is a fraction of the
    /// ensemble size, 1 or above an absolute count.
    pub rate: f64,
}

impl PruningParams {
    /// Validates pruning parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(RankForestError::config(
                "pruning rate must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

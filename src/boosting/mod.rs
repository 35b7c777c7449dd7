//! Boosting loops: the shared training driver and its variants.
//!
//! One generic driver owns the fit→score→evaluate→accept cycle. The
//! plain, stratified-sampling and dropout (DART) variants share it and
//! differ only in two pluggable strategies: a [`sampling`] selector that
//! decides which instances the next tree is fit on, and an iteration
//! policy that decides how a freshly fitted tree is weighted and
//! accepted. Ensemble structure and score arrays are mutated strictly
//! between the data-parallel scoring sections.

pub mod dart;
pub mod sampling;

use crate::config::{BoostingParams, DartParams, SelectiveParams};
use crate::core::{Random, Result, Score};
use crate::dataset::Dataset;
use crate::ensemble::{Ensemble, ScoreUpdate};
use crate::io::{snapshot, EnsembleSnapshot, SnapshotStore};
use crate::metrics::Metric;
use crate::tree::histogram::ThresholdSet;
use crate::tree::{RegressionTree, TreeLearner};

use dart::DartOverlay;
use sampling::{FullSelector, SampleSelector, StratifiedSelector};

/// Active-sample bookkeeping shared by the sampling strategies.
#[derive(Debug)]
pub(crate) struct SampleState {
    /// Instance ids; the first `n_active` entries are the current sample.
    pub ids: Vec<usize>,
    /// Pristine identity ordering, restored before each re-selection.
    pub ids_orig: Vec<usize>,
    /// Number of active instances.
    pub n_active: usize,
    /// Per-instance presence map of the current sample.
    pub presence: Vec<bool>,
}

/// Mutable training state threaded through the driver and strategies.
pub(crate) struct TrainContext<'a> {
    pub params: &'a BoostingParams,
    pub training: &'a Dataset,
    pub validation: Option<&'a Dataset>,
    pub metric: &'a dyn Metric,
    pub thresholds: ThresholdSet,
    pub ensemble: &'a mut Ensemble,
    pub scores_training: Vec<Score>,
    pub scores_validation: Vec<Score>,
    pub responses: Vec<f64>,
    pub response_weights: Vec<f64>,
    pub sample: SampleState,
    pub rng: Random,
    /// Metric of the last accepted iteration on training data.
    pub metric_on_training: f64,
    /// Metric of the last accepted iteration on validation data.
    pub metric_on_validation: f64,
}

impl<'a> TrainContext<'a> {
    pub(crate) fn new(
        params: &'a BoostingParams,
        training: &'a Dataset,
        validation: Option<&'a Dataset>,
        metric: &'a dyn Metric,
        ensemble: &'a mut Ensemble,
    ) -> Self {
        let n = training.num_instances();
        let n_validation = validation.map_or(0, |v| v.num_instances());
        TrainContext {
            params,
            training,
            validation,
            metric,
            thresholds: ThresholdSet::new(training, params.tree.n_thresholds),
            ensemble,
            scores_training: vec![0.0; n],
            scores_validation: vec![0.0; n_validation],
            responses: vec![0.0; n],
            response_weights: vec![0.0; n],
            sample: SampleState {
                ids: (0..n).collect(),
                ids_orig: (0..n).collect(),
                n_active: n,
                presence: vec![true; n],
            },
            rng: Random::with_seed(params.seed),
            metric_on_training: f64::MIN,
            metric_on_validation: f64::MIN,
        }
    }

    pub(crate) fn has_validation(&self) -> bool {
        self.validation.is_some()
    }

    pub(crate) fn evaluate_training(&self) -> f64 {
        self.metric.evaluate(self.training, &self.scores_training)
    }

    pub(crate) fn evaluate_validation(&self) -> f64 {
        match self.validation {
            Some(validation) => self.metric.evaluate(validation, &self.scores_validation),
            None => f64::MIN,
        }
    }

    pub(crate) fn update_training_scores(&mut self, members: &[usize], direction: ScoreUpdate) {
        self.ensemble
            .update_scores(self.training, &mut self.scores_training, members, direction);
    }

    pub(crate) fn update_validation_scores(&mut self, members: &[usize], direction: ScoreUpdate) {
        if let Some(validation) = self.validation {
            self.ensemble
                .update_scores(validation, &mut self.scores_validation, members, direction);
        }
    }

    pub(crate) fn rescore_all(&mut self) {
        self.ensemble
            .score_dataset(self.training, &mut self.scores_training);
        if let Some(validation) = self.validation {
            self.ensemble
                .score_dataset(validation, &mut self.scores_validation);
        }
    }
}

/// Per-iteration hooks differentiating the boosting variants.
pub(crate) trait IterationPolicy {
    /// Runs before pseudoresponse computation; the dropout overlay does
    /// its temporary subtraction here.
    fn begin_iteration(&mut self, _ctx: &mut TrainContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Weight for the freshly fitted, not yet appended tree.
    fn tree_weight(&mut self, ctx: &mut TrainContext<'_>, tree: &RegressionTree) -> Result<f64>;

    /// Integrates the just-pushed tree into the running scores and
    /// returns the accepted (training, validation) metrics for the
    /// iteration.
    fn accept(&mut self, ctx: &mut TrainContext<'_>) -> Result<(f64, f64)>;

    /// Runs when the iteration improved the best metric, before the
    /// rollback size is recorded.
    fn on_improved(&mut self, _ctx: &mut TrainContext<'_>, _iteration: usize) -> Result<()> {
        Ok(())
    }

    /// Runs after the final rollback.
    fn finalize(&mut self, _ctx: &mut TrainContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Plain gradient boosting: fixed shrinkage, unconditional acceptance.
struct PlainPolicy {
    shrinkage: f64,
}

impl IterationPolicy for PlainPolicy {
    fn tree_weight(&mut self, _ctx: &mut TrainContext<'_>, _tree: &RegressionTree) -> Result<f64> {
        Ok(self.shrinkage)
    }

    fn accept(&mut self, ctx: &mut TrainContext<'_>) -> Result<(f64, f64)> {
        let last = ctx.ensemble.len() - 1;
        ctx.update_training_scores(&[last], ScoreUpdate::Add);
        let metric_training = ctx.evaluate_training();
        let metric_validation = if ctx.has_validation() {
            ctx.update_validation_scores(&[last], ScoreUpdate::Add);
            ctx.evaluate_validation()
        } else {
            f64::MIN
        };
        Ok((metric_training, metric_validation))
    }
}

/// Summary of a completed training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Iterations executed.
    pub iterations: usize,
    /// Trees in the final (rolled back) ensemble.
    pub trees: usize,
    /// Best training metric observed.
    pub best_metric_on_training: f64,
    /// Best validation metric observed, when validation data was given.
    pub best_metric_on_validation: Option<f64>,
}

/// Gradient-boosted ensemble trainer.
///
/// Construct with [`Booster::new`], optionally layer the DART overlay or
/// the stratified sampling variant on top, then call [`Booster::fit`].
#[derive(Debug)]
pub struct Booster {
    params: BoostingParams,
    dart: Option<DartParams>,
    selective: Option<SelectiveParams>,
    ensemble: Ensemble,
}

impl Booster {
    /// Creates a trainer, validating the configuration fail-fast.
    pub fn new(params: BoostingParams) -> Result<Self> {
        params.validate()?;
        let capacity = params.n_trees;
        Ok(Booster {
            params,
            dart: None,
            selective: None,
            ensemble: Ensemble::with_capacity(capacity),
        })
    }

    /// Layers DART dropout regularization over the boosting loop.
    pub fn with_dart(mut self, dart: DartParams) -> Result<Self> {
        dart.validate()?;
        self.dart = Some(dart);
        Ok(self)
    }

    /// Switches instance selection to the stratified sampling variant.
    pub fn with_stratified_sampling(mut self, selective: SelectiveParams) -> Result<Self> {
        selective.validate()?;
        self.selective = Some(selective);
        Ok(self)
    }

    /// Resumes from a previously saved snapshot.
    ///
    /// The snapshot's hyperparameters must match the configuration;
    /// otherwise the import fails and nothing is mutated.
    pub fn resume(params: BoostingParams, snapshot: EnsembleSnapshot) -> Result<Self> {
        let mut booster = Booster::new(params)?;
        if !snapshot.info.matches(&booster.params) {
            return Err(crate::core::RankForestError::incompatible_model(format!(
                "snapshot hyperparameters {:?} do not match the current configuration",
                snapshot.info
            )));
        }
        for ((tree, weight), label) in snapshot
            .trees
            .into_iter()
            .zip(snapshot.weights)
            .zip(snapshot.labels)
        {
            booster.ensemble.push(tree, weight, label)?;
        }
        Ok(booster)
    }

    /// The trained ensemble.
    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Mutable access to the ensemble, for post-training pruning.
    pub fn ensemble_mut(&mut self) -> &mut Ensemble {
        &mut self.ensemble
    }

    /// Consumes the trainer, returning the ensemble.
    pub fn into_ensemble(self) -> Ensemble {
        self.ensemble
    }

    /// The trainer's configuration.
    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Runs the boosting loop until the tree cap or early stopping.
    pub fn fit(
        &mut self,
        training: &Dataset,
        validation: Option<&Dataset>,
        metric: &dyn Metric,
        store: Option<&dyn SnapshotStore>,
    ) -> Result<TrainingReport> {
        log::debug!(
            "training on {} instances, {} features, {} worker threads",
            training.num_instances(),
            training.num_features(),
            num_cpus::get()
        );
        let mut policy: Box<dyn IterationPolicy> = match &self.dart {
            Some(dart_params) => Box::new(DartOverlay::new(
                dart_params.clone(),
                self.params.shrinkage,
                self.ensemble.len(),
            )),
            None => Box::new(PlainPolicy {
                shrinkage: self.params.shrinkage,
            }),
        };
        let mut selector: Box<dyn SampleSelector> = match &self.selective {
            Some(selective) => Box::new(StratifiedSelector::new(selective.clone())),
            None => Box::new(FullSelector),
        };
        let mut ctx = TrainContext::new(
            &self.params,
            training,
            validation,
            metric,
            &mut self.ensemble,
        );
        run(&mut ctx, policy.as_mut(), selector.as_mut(), store)
    }
}

/// The shared boosting driver.
fn run(
    ctx: &mut TrainContext<'_>,
    policy: &mut dyn IterationPolicy,
    selector: &mut dyn SampleSelector,
    store: Option<&dyn SnapshotStore>,
) -> Result<TrainingReport> {
    let mut best_metric_training = f64::MIN;
    let mut best_metric_validation = f64::MIN;
    let mut best_size = 0;
    let mut iteration = ctx.ensemble.len();
    let mut best_iteration = iteration.saturating_sub(1);
    let mut iterations_run = 0;

    if !ctx.ensemble.is_empty() {
        // Resuming from a saved model: rebuild the score arrays and seed
        // the best-iteration bookkeeping from the imported ensemble.
        ctx.rescore_all();
        best_metric_training = ctx.evaluate_training();
        ctx.metric_on_training = best_metric_training;
        if ctx.has_validation() {
            best_metric_validation = ctx.evaluate_validation();
            ctx.metric_on_validation = best_metric_validation;
        }
        best_size = ctx.ensemble.len();
        log::info!(
            "resuming from {} trees, {} on training = {:.4}",
            ctx.ensemble.len(),
            ctx.metric.name(),
            best_metric_training
        );
    }

    while ctx.ensemble.len() < ctx.params.n_trees {
        if ctx.has_validation()
            && ctx.params.early_stopping_rounds > 0
            && iteration > best_iteration + ctx.params.early_stopping_rounds
        {
            log::info!(
                "no improvement in {} rounds, stopping early",
                ctx.params.early_stopping_rounds
            );
            break;
        }

        policy.begin_iteration(ctx)?;
        selector.refresh(ctx, iteration);
        apply_subsample(ctx);
        refresh_presence(ctx);

        let presence = if ctx.sample.n_active < ctx.training.num_instances() {
            Some(ctx.sample.presence.as_slice())
        } else {
            None
        };
        ctx.metric.pseudo_responses(
            ctx.training,
            &ctx.scores_training,
            presence,
            &mut ctx.responses,
            &mut ctx.response_weights,
        );

        let instances = ctx.sample.ids[..ctx.sample.n_active].to_vec();
        let tree = TreeLearner::new(&ctx.params.tree).grow(
            &ctx.thresholds,
            &ctx.responses,
            Some(&ctx.response_weights),
            instances,
        );

        let weight = policy.tree_weight(ctx, &tree)?;
        ctx.ensemble.push(tree, weight, 0.0)?;

        let (metric_training, metric_validation) = policy.accept(ctx)?;
        ctx.metric_on_training = metric_training;
        if ctx.has_validation() {
            ctx.metric_on_validation = metric_validation;
        }

        let improved = if ctx.has_validation() {
            metric_validation > best_metric_validation
        } else {
            metric_training > best_metric_training
        };
        if improved {
            best_metric_training = metric_training;
            best_metric_validation = metric_validation;
            best_iteration = iteration;
            policy.on_improved(ctx, iteration)?;
            best_size = ctx.ensemble.len();
        }
        selector.record_improvement(improved);

        if ctx.has_validation() {
            log::info!(
                "iter {:>5}  {} train {:.4} valid {:.4}{}",
                iteration + 1,
                ctx.metric.name(),
                metric_training,
                metric_validation,
                if improved { " *" } else { "" }
            );
        } else {
            log::info!(
                "iter {:>5}  {} train {:.4}{}",
                iteration + 1,
                ctx.metric.name(),
                metric_training,
                if improved { " *" } else { "" }
            );
        }

        if let Some(store) = store {
            let every = ctx.params.checkpoint_every;
            if every != 0 && ctx.ensemble.len() % every == 0 {
                let snap = snapshot(ctx.params, ctx.ensemble);
                if let Err(err) = store.save(&snap) {
                    // Checkpoint failures are non-fatal.
                    log::warn!("checkpoint failed: {}", err);
                }
            }
        }

        iteration += 1;
        iterations_run += 1;
    }

    if ctx.has_validation() {
        while ctx.ensemble.len() > best_size {
            ctx.ensemble.pop();
        }
        policy.finalize(ctx)?;
    }

    Ok(TrainingReport {
        iterations: iterations_run,
        trees: ctx.ensemble.len(),
        best_metric_on_training: best_metric_training,
        best_metric_on_validation: if ctx.has_validation() {
            Some(best_metric_validation)
        } else {
            None
        },
    })
}

/// Uniformly shuffles and truncates the active sample when configured.
fn apply_subsample(ctx: &mut TrainContext<'_>) {
    let subsample = ctx.params.subsample;
    if subsample == 1.0 {
        return;
    }
    let n_active = ctx.sample.n_active;
    ctx.rng.shuffle(&mut ctx.sample.ids[..n_active]);
    ctx.sample.n_active = if subsample > 1.0 {
        (subsample as usize).min(n_active)
    } else {
        ((subsample * n_active as f64).floor() as usize).max(1)
    };
}

/// Rebuilds the per-instance presence map from the active prefix.
fn refresh_presence(ctx: &mut TrainContext<'_>) {
    let n = ctx.training.num_instances();
    if ctx.sample.n_active < n {
        ctx.sample.presence.fill(false);
        for &i in &ctx.sample.ids[..ctx.sample.n_active] {
            ctx.sample.presence[i] = true;
        }
    } else {
        ctx.sample.presence.fill(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeParams;
    use crate::metrics::PointwiseRmse;
    use ndarray::{Array1, Array2};

    fn regression_dataset() -> Dataset {
        let values: Vec<f32> = (0..32).map(|v| v as f32).collect();
        let labels: Vec<f32> = values.iter().map(|&v| if v < 16.0 { 1.0 } else { -1.0 }).collect();
        let features = Array2::from_shape_vec((32, 1), values).unwrap();
        Dataset::new(features, Array1::from_vec(labels), vec![0, 16, 32]).unwrap()
    }

    fn params(n_trees: usize) -> BoostingParams {
        BoostingParams {
            n_trees,
            shrinkage: 0.5,
            early_stopping_rounds: 0,
            tree: TreeParams {
                n_leaves: 4,
                min_leaf_support: 1,
                ..TreeParams::default()
            },
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_plain_training_reduces_error() {
        let ds = regression_dataset();
        let mut booster = Booster::new(params(20)).unwrap();
        let report = booster.fit(&ds, None, &PointwiseRmse::new(), None).unwrap();

        assert_eq!(report.trees, 20);
        assert_eq!(report.iterations, 20);
        // Negated RMSE close to zero means near-perfect fit.
        assert!(report.best_metric_on_training > -0.05);
        assert!(report.best_metric_on_validation.is_none());

        let mut scores = vec![0.0; 32];
        booster.ensemble().score_dataset(&ds, &mut scores);
        assert!(scores[0] > 0.5 && scores[31] < -0.5);
    }

    #[test]
    fn test_validation_rollback_to_best() {
        let ds = regression_dataset();
        let mut booster = Booster::new(params(15)).unwrap();
        let report = booster
            .fit(&ds, Some(&ds), &PointwiseRmse::new(), None)
            .unwrap();
        // Validation equals training here, so the best iteration is the
        // last one and the rollback keeps everything.
        assert_eq!(report.trees, booster.ensemble().len());
        assert!(report.best_metric_on_validation.is_some());
    }

    #[test]
    fn test_subsample_still_trains() {
        let ds = regression_dataset();
        let mut config = params(10);
        config.subsample = 0.5;
        let mut booster = Booster::new(config).unwrap();
        let report = booster.fit(&ds, None, &PointwiseRmse::new(), None).unwrap();
        assert_eq!(report.trees, 10);
        assert!(report.best_metric_on_training > -0.6);
    }

    #[test]
    fn test_seeded_runs_reproduce() {
        let ds = regression_dataset();
        let mut config = params(8);
        config.subsample = 0.5;
        config.seed = 7;

        let mut first = Booster::new(config.clone()).unwrap();
        first.fit(&ds, None, &PointwiseRmse::new(), None).unwrap();
        let mut second = Booster::new(config).unwrap();
        second.fit(&ds, None, &PointwiseRmse::new(), None).unwrap();

        let mut scores_first = vec![0.0; 32];
        let mut scores_second = vec![0.0; 32];
        first.ensemble().score_dataset(&ds, &mut scores_first);
        second.ensemble().score_dataset(&ds, &mut scores_second);
        assert_eq!(scores_first, scores_second);
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let mut config = params(10);
        config.shrinkage = 0.0;
        assert!(Booster::new(config).is_err());
    }
}

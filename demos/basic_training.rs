//! Trains a small ranking ensemble on synthetic data, applies DART
//! regularization and prunes the result.
//!
//! Run with `cargo run --example basic_training`.

use anyhow::Result;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rankforest::{
    Booster, BoostingParams, DartNormalization, DartParams, DartSampling, Dataset,
    EnsemblePruning, LineSearch, LineSearchParams, Metric, Ndcg, PruningMethod, PruningParams,
    Random, TreeParams,
};

fn synthetic_ranking(n_queries: usize, docs_per_query: usize, seed: u64) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = n_queries * docs_per_query;
    let mut features = Vec::with_capacity(n * 3);
    let mut labels = Vec::with_capacity(n);
    let mut offsets = vec![0];

    for _ in 0..n_queries {
        for d in 0..docs_per_query {
            let relevance = (d % 3) as f32;
            features.push(relevance + 0.4 * rng.gen::<f32>());
            features.push(rng.gen::<f32>());
            features.push(0.5 * relevance + 0.3 * rng.gen::<f32>());
            labels.push(relevance);
        }
        offsets.push(offsets.last().unwrap() + docs_per_query);
    }

    let features = Array2::from_shape_vec((n, 3), features)?;
    Ok(Dataset::new(features, Array1::from_vec(labels), offsets)?)
}

fn main() -> Result<()> {
    env_logger::init();

    let training = synthetic_ranking(40, 12, 17)?;
    let validation = synthetic_ranking(10, 12, 18)?;
    let metric = Ndcg::new(10);

    let params = BoostingParams {
        n_trees: 80,
        shrinkage: 0.1,
        early_stopping_rounds: 30,
        tree: TreeParams {
            n_leaves: 8,
            min_leaf_support: 2,
            ..TreeParams::default()
        },
        seed: 17,
        ..BoostingParams::default()
    };
    let dart = DartParams {
        sample_type: DartSampling::Uniform,
        normalize_type: DartNormalization::Tree,
        rate_drop: 0.15,
        skip_drop: 0.3,
        keep_drop: false,
    };

    let mut booster = Booster::new(params)?.with_dart(dart)?;
    let report = booster.fit(&training, Some(&validation), &metric, None)?;
    println!(
        "trained {} trees, best validation {} = {:.4}",
        report.trees,
        metric.name(),
        report.best_metric_on_validation.unwrap_or(f64::NAN)
    );

    let search = LineSearch::new(LineSearchParams::default())?;
    let mut pruning = EnsemblePruning::new(
        PruningParams {
            method: PruningMethod::QualityLoss,
            rate: 0.25,
        },
        Some(search),
    )?;
    let mut rng = Random::with_seed(17);
    pruning.prune_ensemble(booster.ensemble_mut(), &training, &metric, &mut rng)?;

    let mut scores = vec![0.0; validation.num_instances()];
    booster.ensemble().score_dataset(&validation, &mut scores);
    println!(
        "after pruning to {} trees: validation {} = {:.4}",
        booster.ensemble().len(),
        metric.name(),
        metric.evaluate(&validation, &scores)
    );
    Ok(())
}

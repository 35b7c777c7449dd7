//! End-to-end tests for the DART dropout overlay.

mod common;

use common::synthetic_ranking;
use rankforest::{
    Booster, BoostingParams, DartNormalization, DartParams, DartSampling, Metric, Ndcg,
    TreeParams,
};

fn params(n_trees: usize, seed: u64) -> BoostingParams {
    BoostingParams {
        n_trees,
        shrinkage: 0.2,
        early_stopping_rounds: 0,
        tree: TreeParams {
            n_leaves: 6,
            min_leaf_support: 1,
            ..TreeParams::default()
        },
        seed,
        ..BoostingParams::default()
    }
}

fn dart(sample_type: DartSampling, normalize_type: DartNormalization) -> DartParams {
    DartParams {
        sample_type,
        normalize_type,
        rate_drop: 0.2,
        skip_drop: 0.1,
        keep_drop: false,
    }
}

#[test]
fn every_sampling_type_trains() {
    let training = synthetic_ranking(8, 10, 11);
    let metric = Ndcg::new(10);
    let baseline = metric.evaluate(&training, &vec![0.0; training.num_instances()]);

    for sample_type in [
        DartSampling::Uniform,
        DartSampling::Weighted,
        DartSampling::WeightedInv,
        DartSampling::TopHalf,
        DartSampling::Count2,
        DartSampling::Count3,
        DartSampling::Count2N,
        DartSampling::Count3N,
    ] {
        let mut booster = Booster::new(params(12, 11))
            .unwrap()
            .with_dart(dart(sample_type, DartNormalization::Tree))
            .unwrap();
        let report = booster.fit(&training, None, &metric, None).unwrap();
        assert_eq!(report.trees, 12, "sample type {:?}", sample_type);
        assert!(
            report.best_metric_on_training > baseline,
            "sample type {:?} did not improve over baseline",
            sample_type
        );
        assert!(booster
            .ensemble()
            .weights()
            .iter()
            .all(|w| w.is_finite()));
    }
}

#[test]
fn every_normalization_type_trains() {
    let training = synthetic_ranking(8, 10, 12);
    let metric = Ndcg::new(10);

    for normalize_type in [
        DartNormalization::Tree,
        DartNormalization::None,
        DartNormalization::Weighted,
        DartNormalization::Forest,
        DartNormalization::TreeAdaptive,
        DartNormalization::TreeBoost3,
        DartNormalization::LineSearch,
    ] {
        let mut booster = Booster::new(params(10, 12))
            .unwrap()
            .with_dart(dart(DartSampling::Uniform, normalize_type))
            .unwrap();
        let report = booster.fit(&training, None, &metric, None).unwrap();
        assert_eq!(report.trees, 10, "normalization {:?}", normalize_type);
        assert!(booster.ensemble().weights().iter().all(|w| w.is_finite()));
    }
}

#[test]
fn keep_drop_with_validation() {
    let training = synthetic_ranking(10, 10, 13);
    let validation = synthetic_ranking(5, 10, 14);
    let metric = Ndcg::new(10);

    let mut dart_params = dart(DartSampling::Uniform, DartNormalization::Tree);
    dart_params.keep_drop = true;
    dart_params.rate_drop = 0.3;
    dart_params.skip_drop = 0.0;

    let mut config = params(15, 13);
    config.early_stopping_rounds = 15;
    let mut booster = Booster::new(config)
        .unwrap()
        .with_dart(dart_params)
        .unwrap();
    let report = booster
        .fit(&training, Some(&validation), &metric, None)
        .unwrap();

    // After the final rollback every surviving member carries its
    // permanently committed weight and nothing is zero weighted.
    let ensemble = booster.ensemble();
    assert_eq!(report.trees, ensemble.len());
    for t in 0..ensemble.len() {
        assert_eq!(ensemble.entry(t).weight(), ensemble.entry(t).saved_weight());
        assert!(ensemble.entry(t).weight() != 0.0);
    }

    // The restored ensemble reproduces the reported best metric.
    let mut scores = vec![0.0; validation.num_instances()];
    ensemble.score_dataset(&validation, &mut scores);
    let replayed = metric.evaluate(&validation, &scores);
    assert!((replayed - report.best_metric_on_validation.unwrap()).abs() < 1e-6);
}

#[test]
fn skip_drop_one_disables_dropout() {
    let training = synthetic_ranking(6, 10, 15);
    let metric = Ndcg::new(10);

    // With skip_drop = 1 every Bernoulli trial skips the dropout, so the
    // run degenerates to plain boosting under the same seed.
    let mut dart_params = dart(DartSampling::Uniform, DartNormalization::Tree);
    dart_params.skip_drop = 1.0;

    let mut with_dart = Booster::new(params(8, 15))
        .unwrap()
        .with_dart(dart_params)
        .unwrap();
    with_dart.fit(&training, None, &metric, None).unwrap();

    // All trees keep the plain shrinkage weight.
    for &w in &with_dart.ensemble().weights() {
        assert!((w - 0.2).abs() < 1e-12);
    }
}

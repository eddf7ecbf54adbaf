//! Integration test: training and persistence of every ensemble member

use hybrid_ensemble::data::FeatureMatrix;
use hybrid_ensemble::training::{
    FeedForwardNetwork, ForestConfig, LinearConfig, LogisticRegression, Model, NetworkConfig, RandomForest,
};
use ndarray::{array, Array2};

/// Four samples, label is 1 exactly when x1 > 0.5
fn separable() -> FeatureMatrix {
    FeatureMatrix::new(
        array![[0.0, 0.1], [0.2, 0.9], [0.8, 0.2], [1.0, 0.7]],
        array![0, 0, 1, 1],
    )
    .unwrap()
}

fn larger(n: usize) -> FeatureMatrix {
    let features = Array2::from_shape_fn((n, 4), |(i, j)| {
        let base = if i % 3 == 0 { 1.0 } else { -1.0 };
        base * (1.0 + j as f32 * 0.25) + (i % 7) as f32 * 0.05
    });
    let labels = (0..n).map(|i| i32::from(i % 3 == 0)).collect();
    FeatureMatrix::new(features, labels).unwrap()
}

fn predictions(model: &dyn Model, data: &FeatureMatrix) -> Vec<i32> {
    model.predict_batch(data).unwrap()
}

#[test]
fn test_logistic_regression_learns_separable_data() {
    let data = separable();
    let mut model = LogisticRegression::new(
        LinearConfig::new()
            .with_learning_rate(1.0)
            .with_max_iterations(500)
            .with_random_state(7),
    );
    let losses = model.fit(&data).unwrap();

    assert_eq!(losses.len(), 500);
    assert!(losses.last().unwrap() < losses.first().unwrap());
    assert_eq!(predictions(&model, &data), vec![0, 0, 1, 1]);
}

#[test]
fn test_network_loss_decreases() {
    let data = separable();
    let mut model = FeedForwardNetwork::new(
        NetworkConfig::new()
            .with_hidden_layers(vec![4])
            .with_epochs(300)
            .with_learning_rate(0.5)
            .with_random_state(3),
    );
    let losses = model.fit(&data).unwrap();

    assert_eq!(losses.len(), 300);
    assert!(losses.last().unwrap() < losses.first().unwrap());
    assert_eq!(model.layer_sizes(), &[2, 4, 2]);
}

#[test]
fn test_forest_fits_every_tree() {
    let data = larger(60);
    let mut forest = RandomForest::new(
        ForestConfig::new()
            .with_n_trees(8)
            .with_max_depth(4)
            .with_random_state(11),
    );
    forest.fit(&data).unwrap();

    assert_eq!(forest.n_trees(), 8);
    assert!(forest.depth() <= 4);
    let accuracy = predictions(&forest, &data)
        .iter()
        .zip(data.labels())
        .filter(|(p, l)| p == l)
        .count() as f64
        / data.n_samples() as f64;
    assert!(accuracy > 0.9, "accuracy {}", accuracy);
}

#[test]
fn test_seeded_forests_are_reproducible() {
    let data = larger(45);
    let config = ForestConfig::new().with_n_trees(5).with_max_depth(3).with_random_state(42);

    let mut a = RandomForest::new(config.clone());
    let mut b = RandomForest::new(config);
    a.fit(&data).unwrap();
    b.fit(&data).unwrap();

    assert_eq!(a.trees(), b.trees());
}

#[test]
fn test_save_load_preserves_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let data = larger(48);

    let mut forest = RandomForest::new(ForestConfig::new().with_n_trees(4).with_max_depth(3).with_random_state(1));
    let mut network = FeedForwardNetwork::new(NetworkConfig::new().with_epochs(20).with_random_state(1));
    let mut linear = LogisticRegression::new(LinearConfig::new().with_max_iterations(50).with_random_state(1));
    forest.fit(&data).unwrap();
    network.fit(&data).unwrap();
    linear.fit(&data).unwrap();

    let trained: Vec<(Box<dyn Model>, Box<dyn Model>, &str)> = vec![
        (Box::new(forest), Box::new(RandomForest::default()), "random_forest_model.bin"),
        (Box::new(network), Box::new(FeedForwardNetwork::default()), "mlp_model.bin"),
        (Box::new(linear), Box::new(LogisticRegression::default()), "logistic_regression_model.bin"),
    ];

    for (model, mut restored, file) in trained {
        let path = dir.path().join(file);
        model.save(&path).unwrap();
        restored.load(&path).unwrap();

        assert!(restored.is_fitted(), "{} not fitted after load", model.name());
        assert_eq!(restored.n_features(), 4);
        assert_eq!(predictions(model.as_ref(), &data), predictions(restored.as_ref(), &data));
    }
}

#[test]
fn test_unfitted_models_refuse_to_predict() {
    let models: Vec<Box<dyn Model>> = vec![
        Box::new(RandomForest::default()),
        Box::new(FeedForwardNetwork::default()),
        Box::new(LogisticRegression::default()),
    ];
    for model in models {
        assert!(!model.is_fitted());
        assert!(model.predict(&[0.0, 0.0]).is_err(), "{} predicted while unfitted", model.name());
    }
}

#[test]
fn test_wrong_sample_width_is_rejected() {
    let mut model = LogisticRegression::new(LinearConfig::new().with_max_iterations(5).with_random_state(2));
    model.fit(&separable()).unwrap();
    assert!(model.predict(&[0.1, 0.2, 0.3]).is_err());
}

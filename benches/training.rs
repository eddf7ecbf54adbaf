use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hybrid_ensemble::data::FeatureMatrix;
use hybrid_ensemble::training::{
    FeedForwardNetwork, ForestConfig, LinearConfig, LogisticRegression, Model, NetworkConfig, RandomForest,
};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_loan_data(n_rows: usize) -> FeatureMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let features = Array2::from_shape_fn((n_rows, 5), |_| rng.gen::<f32>() * 2.0 - 1.0);
    let labels = features
        .rows()
        .into_iter()
        .map(|row| i32::from(row[0] + row[1] - row[3] > 0.0))
        .collect();
    FeatureMatrix::new(features, labels).unwrap()
}

fn bench_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_forest");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let data = create_loan_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("fit", n_rows), &data, |b, data| {
            b.iter(|| {
                let mut forest = RandomForest::new(
                    ForestConfig::new().with_n_trees(20).with_max_depth(8).with_random_state(1),
                );
                forest.fit(black_box(data)).unwrap();
                forest
            })
        });
    }

    group.finish();
}

fn bench_network(c: &mut Criterion) {
    let mut group = c.benchmark_group("mlp");
    group.sample_size(10);
    let data = create_loan_data(2000);

    // wide layers take the parallel neuron path, narrow ones stay sequential
    for (name, hidden) in [("narrow", vec![16, 8]), ("wide", vec![256, 128])] {
        group.bench_with_input(BenchmarkId::new("epoch", name), &hidden, |b, hidden| {
            b.iter(|| {
                let mut network = FeedForwardNetwork::new(
                    NetworkConfig::new()
                        .with_hidden_layers(hidden.clone())
                        .with_epochs(1)
                        .with_random_state(1),
                );
                network.fit(black_box(&data)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("logistic_regression");

    for n_rows in [1000, 10000].iter() {
        let data = create_loan_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("fit", n_rows), &data, |b, data| {
            b.iter(|| {
                let mut model = LogisticRegression::new(
                    LinearConfig::new().with_max_iterations(50).with_random_state(1),
                );
                model.fit(black_box(data)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let data = create_loan_data(2000);
    let mut forest = RandomForest::new(ForestConfig::new().with_n_trees(50).with_random_state(1));
    forest.fit(&data).unwrap();

    c.bench_function("random_forest_predict_batch", |b| {
        b.iter(|| forest.predict_batch(black_box(&data)).unwrap())
    });
}

criterion_group!(benches, bench_forest, bench_network, bench_linear, bench_prediction);
criterion_main!(benches);

//! Integration test: CSV -> concurrent training -> distributed evaluation -> report

use hybrid_ensemble::evaluation::{evaluate_distributed, format_report, save_report};
use hybrid_ensemble::orchestrator::TrainingOrchestrator;
use hybrid_ensemble::training::{
    EnsembleConfig, ForestConfig, LinearConfig, ModelKind, NetworkConfig, OrchestratorConfig,
};
use hybrid_ensemble::utils::DataLoader;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Sixty preprocessed rows; approval follows the sign of the income column
fn write_dataset(dir: &Path) -> PathBuf {
    let mut csv = String::from("Income,Credit_Score,Loan_Amount,DTI_Ratio,Employment_Status,Approval\n");
    for i in 0..60 {
        let approved = i % 2 == 0;
        let income = if approved { 1.0 } else { -1.0 } + (i % 5) as f32 * 0.05;
        let credit = if approved { 0.6 } else { -0.4 } + (i % 3) as f32 * 0.1;
        let loan = (i % 4) as f32 * 0.25 - 0.5;
        let dti = if approved { -0.3 } else { 0.3 };
        let employed = i32::from(approved || i % 3 == 0);
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{}",
            income,
            credit,
            loan,
            dti,
            employed,
            i32::from(approved)
        );
    }
    let path = dir.join("loan_data_preprocessed.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn config(output_dir: &Path) -> EnsembleConfig {
    EnsembleConfig::new()
        .with_forest(ForestConfig::new().with_n_trees(10).with_max_depth(5).with_random_state(3))
        .with_network(NetworkConfig::new().with_epochs(40).with_learning_rate(0.1).with_random_state(3))
        .with_linear(LinearConfig::new().with_learning_rate(0.5).with_max_iterations(200).with_random_state(3))
        .with_orchestrator(
            OrchestratorConfig::new()
                .with_threads_per_worker(2)
                .with_output_dir(output_dir),
        )
}

#[test]
fn test_train_evaluate_report() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = write_dataset(dir.path());
    let models_dir = dir.path().join("models");

    let summary = TrainingOrchestrator::new(config(&models_dir))
        .run_csv(&data_path)
        .unwrap();
    assert!(summary.all_succeeded(), "{}", summary.report());
    assert_eq!(summary.shape.n_samples, 60);
    assert_eq!(summary.shape.n_features, 5);
    assert_eq!(
        summary.outcomes.iter().map(|o| o.kind).collect::<Vec<_>>(),
        ModelKind::ALL.to_vec()
    );
    assert!(summary.outcomes.iter().all(|o| o.n_samples == 20));

    let files: Vec<PathBuf> = ModelKind::ALL
        .iter()
        .map(|kind| models_dir.join(kind.file_name()))
        .collect();

    let data = DataLoader::new().load_raw(&data_path).unwrap();
    let (_, test) = data.train_test_split(0.2).unwrap();
    assert_eq!(test.n_samples(), 12);

    let evaluations = evaluate_distributed(&files, &test, 2).unwrap();
    assert_eq!(evaluations.len(), 3);
    for (evaluation, file) in evaluations.iter().zip(&files) {
        assert_eq!(&evaluation.path, file);
        let metrics = evaluation.result.as_ref().unwrap();
        assert_eq!(metrics.n_samples(), 12);
        assert!((0.0..=1.0).contains(&metrics.accuracy));
    }
    let ranks: Vec<usize> = evaluations.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![0, 1, 0]);

    let report_path = dir.path().join("results").join("evaluation_results.txt");
    save_report(&report_path, &format_report(&evaluations)).unwrap();
    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("Random Forest"));
    assert!(report.contains("MLP"));
    assert!(report.contains("Logistic Regression"));
    assert!(report.contains("F1 Score"));
}

#[test]
fn test_missing_model_file_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = write_dataset(dir.path());
    let data = DataLoader::new().load_raw(&data_path).unwrap();

    let files = vec![dir.path().join("logistic_regression_model.bin")];
    let evaluations = evaluate_distributed(&files, &data, 3).unwrap();

    assert_eq!(evaluations.len(), 1);
    assert!(evaluations[0].result.is_err());
    assert!(format_report(&evaluations).contains("Failed"));
}

#[test]
fn test_config_file_round_trip_drives_training() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = write_dataset(dir.path());
    let config_path = dir.path().join("ensemble.json");

    config(&dir.path().join("out")).to_json_file(&config_path).unwrap();
    let loaded = EnsembleConfig::from_json_file(&config_path).unwrap();
    assert_eq!(loaded.forest.n_trees, 10);

    let summary = TrainingOrchestrator::new(loaded).run_csv(&data_path).unwrap();
    assert!(summary.all_succeeded());
    assert!(dir.path().join("out").join("mlp_model.bin").exists());
}

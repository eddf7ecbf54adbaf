//! Command-line interface for training, evaluation and prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::ensemble::{Decision, EnsemblePredictor, LoanApplication};
use crate::evaluation::{
    evaluate_distributed, format_report, save_report, validate_model_file, DEFAULT_REPORT_PATH,
    DEFAULT_TEST_RATIO,
};
use crate::orchestrator::TrainingOrchestrator;
use crate::preprocessing::ColumnStats;
use crate::training::EnsembleConfig;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 110, 110) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", bad("✗"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hybrid-ensemble")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel ensemble of random forest, MLP and logistic regression for loan approval")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train all three models concurrently, one per worker
    Train {
        /// Preprocessed CSV; the sixth column is the label
        #[arg(short, long)]
        data: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for the model files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of workers (must equal the number of model assignments)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Evaluate model files on the held-out part of a dataset
    Evaluate {
        /// Preprocessed CSV; the sixth column is the label
        #[arg(short, long)]
        data: PathBuf,

        /// Model files (forest models are given by their file prefix)
        #[arg(short, long, num_args = 1.., required = true)]
        models: Vec<PathBuf>,

        /// Number of workers sharing the model files
        #[arg(short, long, default_value = "3")]
        workers: usize,

        /// Share of trailing rows used as the test set, in (0, 1]
        #[arg(long, default_value_t = DEFAULT_TEST_RATIO)]
        test_ratio: f64,

        /// Evaluate every row, for a separate test file
        #[arg(long, conflicts_with = "test_ratio")]
        full: bool,

        /// Report file
        #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
        output: PathBuf,
    },

    /// Classify one loan application with the full ensemble
    Predict {
        #[arg(long)]
        income: f32,

        #[arg(long)]
        credit_score: f32,

        #[arg(long)]
        loan_amount: f32,

        #[arg(long)]
        dti_ratio: f32,

        /// 1 if employed, 0 otherwise
        #[arg(long)]
        employment_status: f32,

        /// Directory holding the trained models
        #[arg(short, long, default_value = ".")]
        model_dir: PathBuf,

        /// Column statistics JSON (defaults to the loan dataset statistics)
        #[arg(short, long)]
        stats: Option<PathBuf>,
    },

    /// Check that model files exist and are non-empty
    Validate {
        /// Model files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Compute normalization statistics of a raw dataset
    Stats {
        /// Raw CSV; the sixth column is the label
        #[arg(short, long)]
        data: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    data_path: &Path,
    config_path: Option<&Path>,
    output_dir: Option<&Path>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = match config_path {
        Some(path) => EnsembleConfig::from_json_file(path)?,
        None => EnsembleConfig::default(),
    };
    if let Some(dir) = output_dir {
        config.orchestrator.output_dir = dir.to_path_buf();
    }
    if let Some(n) = workers {
        config.orchestrator.workers = n;
    }

    kv("Data", &data_path.display().to_string());
    kv("Workers", &config.orchestrator.workers.to_string());
    kv("Threads/worker", &config.orchestrator.threads_per_worker.to_string());
    kv("Output", &config.orchestrator.output_dir.display().to_string());
    println!();

    step_run("Training");
    let start = Instant::now();
    let summary = TrainingOrchestrator::new(config).run_csv(data_path)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(timing) => step_ok(&format!(
                "{} {} {}",
                outcome.kind.to_string().white().bold(),
                muted(&format!("worker {} · {} rows ·", outcome.rank, outcome.n_samples)),
                format!("{:.3}s", timing.seconds).white()
            )),
            Err(reason) => step_fail(&format!("{} {}", outcome.kind.to_string().white().bold(), bad(reason))),
        }
    }

    if let Some(fastest) = summary.fastest() {
        println!();
        println!(
            "  {} {} {}",
            ok("fastest"),
            fastest.kind.to_string().white().bold(),
            muted(&format!("{:.3}s", fastest.seconds().unwrap_or_default()))
        );
    }
    println!("  {}", summary.timings_line());

    let files = summary.generated_files();
    if !files.is_empty() {
        section("Generated files");
        for file in files {
            println!("  {}", file.display());
        }
    }
    println!();

    let failed = summary.failures().count();
    if failed > 0 {
        anyhow::bail!("{} of {} models failed to train", failed, summary.outcomes.len());
    }
    Ok(())
}

pub fn cmd_evaluate(
    data_path: &Path,
    models: &[PathBuf],
    workers: usize,
    test_ratio: f64,
    full: bool,
    output: &Path,
) -> anyhow::Result<()> {
    section("Evaluate");

    step_run("Loading data");
    let data = DataLoader::new().load_raw(data_path)?;
    let test_ratio = if full { 1.0 } else { test_ratio };
    let (_, test) = data.train_test_split(test_ratio)?;
    step_done(&format!("{} test rows of {}", test.n_samples(), data.n_samples()));

    step_run(&format!("Evaluating {} models on {} workers", models.len(), workers));
    let start = Instant::now();
    let evaluations = evaluate_distributed(models, &test, workers)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    println!(
        "  {:<28} {:>9} {:>9} {:>9} {:>9}",
        muted("Model"),
        muted("Accuracy"),
        muted("Precision"),
        muted("Recall"),
        muted("F1")
    );
    println!("  {}", dim(&"─".repeat(68)));
    for evaluation in &evaluations {
        let name = evaluation
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &evaluation.result {
            Ok(m) => println!(
                "  {:<28} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
                name, m.accuracy, m.precision, m.recall, m.f1_score
            ),
            Err(reason) => println!("  {:<28} {}", name, bad(&format!("err: {}", reason))),
        }
    }
    println!();

    save_report(output, &format_report(&evaluations))?;
    step_ok(&format!("Report saved → {}", output.display()));
    println!();
    Ok(())
}

pub fn cmd_predict(application: &LoanApplication, model_dir: &Path, stats_path: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    let stats = match stats_path {
        Some(path) => ColumnStats::load(path)?,
        None => ColumnStats::loan_defaults(),
    };

    step_run("Loading models");
    let predictor = EnsemblePredictor::load(model_dir, stats)?;
    step_done(&format!("{} of 3 available", predictor.n_available()));

    let prediction = predictor.predict_application(application)?;

    println!();
    for vote in &prediction.votes {
        let verdict = if vote.prediction == 1 { ok("Approved") } else { bad("Not Approved") };
        println!("  {:<22} {}", muted(&vote.kind.to_string()), verdict);
    }
    if let Some(p) = prediction.linear_probability {
        kv("LR probability", &format!("{:.2}%", p * 100.0));
    }
    println!();

    let decision = match prediction.decision {
        Some(Decision::Approved) => ok(&Decision::Approved.to_string()),
        Some(Decision::NotApproved) => bad(&Decision::NotApproved.to_string()),
        Some(Decision::Borderline) => Decision::Borderline.to_string().yellow(),
        None => dim("unavailable"),
    };
    println!(
        "  {} {} {}",
        muted("Decision"),
        decision.bold(),
        dim(&format!("({}/{} approve)", prediction.approvals(), prediction.votes.len()))
    );
    if let Some(score) = prediction.risk_score {
        kv("Risk score", &format!("{:.2}", score));
    }
    println!();
    Ok(())
}

pub fn cmd_validate(files: &[PathBuf]) -> anyhow::Result<()> {
    section("Validate");

    let mut failures = 0;
    for path in files {
        match validate_model_file(path) {
            Ok(check) => {
                step_ok(&format!("{} {}", path.display(), muted(&format!("{} bytes", check.size_bytes))));
                println!("    {}", dim(&check.header_hex));
            }
            Err(e) => {
                failures += 1;
                step_fail(&format!("{} {}", path.display(), bad(&e.to_string())));
            }
        }
    }
    println!();

    if failures > 0 {
        anyhow::bail!("{} of {} model files failed validation", failures, files.len());
    }
    Ok(())
}

pub fn cmd_stats(data_path: &Path, output: &Path) -> anyhow::Result<()> {
    section("Stats");

    step_run("Loading data");
    let data = DataLoader::new().load_raw(data_path)?;
    step_done(&format!("{} rows × {} features", data.n_samples(), data.n_features()));

    let stats = ColumnStats::fit(&data);
    println!();
    println!("  {:<10} {:>14} {:>14}", muted("Feature"), muted("Mean"), muted("Std"));
    for (i, (mean, std)) in stats.means.iter().zip(&stats.std_devs).enumerate() {
        println!("  {:<10} {:>14.4} {:>14.4}", i, mean, std);
    }
    println!();

    stats.save(output)?;
    step_ok(&format!("Statistics saved → {}", output.display()));
    println!();
    Ok(())
}

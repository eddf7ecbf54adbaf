//! hybrid-ensemble - command-line entry point

use clap::Parser;
use hybrid_ensemble::cli::{cmd_evaluate, cmd_predict, cmd_stats, cmd_train, cmd_validate, Cli, Commands};
use hybrid_ensemble::ensemble::LoanApplication;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hybrid_ensemble=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, config, output_dir, workers } => {
            cmd_train(&data, config.as_deref(), output_dir.as_deref(), workers)?;
        }
        Commands::Evaluate { data, models, workers, test_ratio, full, output } => {
            cmd_evaluate(&data, &models, workers, test_ratio, full, &output)?;
        }
        Commands::Predict {
            income,
            credit_score,
            loan_amount,
            dti_ratio,
            employment_status,
            model_dir,
            stats,
        } => {
            let application = LoanApplication {
                income,
                credit_score,
                loan_amount,
                dti_ratio,
                employment_status,
            };
            cmd_predict(&application, &model_dir, stats.as_deref())?;
        }
        Commands::Validate { files } => {
            cmd_validate(&files)?;
        }
        Commands::Stats { data, output } => {
            cmd_stats(&data, &output)?;
        }
    }

    Ok(())
}

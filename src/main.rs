//! autoop - Main Entry Point

use clap::Parser;
use autoop::cli::{cmd_features, cmd_metrics, cmd_models, cmd_train, Cli, Commands, RunConfig};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoop=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Features { data } => cmd_features(&data)?,
        Commands::Train { data, target, inputs, model, metrics, split, artifacts, config } => {
            let flags = RunConfig { data, target, inputs, model, metrics, split, artifacts };
            cmd_train(flags, config.as_deref())?;
        }
        Commands::Models { task } => cmd_models(task.as_deref())?,
        Commands::Metrics { task } => cmd_metrics(task.as_deref())?,
    }

    Ok(())
}

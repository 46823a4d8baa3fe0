use anyhow::{Context, Result};
use clap::Parser;
use sluice::cli::{self, Cli, Commands};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            let config = load_config(&cli.config_dir)?;
            cli::check_config(&config)?;
        }
        Commands::ShowConfig => {
            init_logging_simple();
            let config = load_config(&cli.config_dir)?;
            cli::show_config(&config)?;
        }
        Commands::Quote { amount } => {
            let config = load_config(&cli.config_dir)?;
            init_logging(&config.logging);
            cli::run_quote(&config, *amount)
                .await
                .context("quote failed")?;
        }
        Commands::Execute {
            amount,
            min_output,
            nonce,
            deadline_secs,
        } => {
            let config = load_config(&cli.config_dir)?;
            init_logging(&config.logging);
            cli::run_execute(&config, *amount, *min_output, *nonce, *deadline_secs)
                .await
                .context("trade execution failed")?;
        }
    }

    Ok(())
}

fn load_config(config_dir: &str) -> Result<sluice::config::AppConfig> {
    cli::load_config(config_dir)
        .with_context(|| format!("failed to load configuration from {}", config_dir))
}

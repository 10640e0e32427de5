//! clusterproof -- staged acceptance tests for deployed Consul clusters.
//!
//! # Usage
//!
//! ```bash
//! clusterproof run                                 # every configured scenario
//! clusterproof run -s consul-cluster --skip teardown
//! clusterproof run -s consul-cluster -w /tmp/clusterproof-ab12/examples/consul-cluster \
//!     --skip setup_image --skip deploy
//! clusterproof config validate
//! clusterproof workspace show /tmp/clusterproof-ab12/examples/consul-cluster
//! ```

use clap::Parser;
use tracing::info;

use clusterproof_cli::cli::{Cli, Commands};
use clusterproof_cli::commands;
use clusterproof_cli::error::CliError;
use clusterproof_cli::logging::init_tracing;
use clusterproof_cli::output::OutputWriter;
use clusterproof_core::config::{GeneralConfig, HarnessConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Run(args) => {
            let config = HarnessConfig::load(&cli.config).await?;
            start_tracing(&config.general, cli.log_level.as_deref())?;
            info!(config = %cli.config.display(), "clusterproof starting");
            commands::run::execute(args, config, &writer).await
        }
        // `config` must still report on a file that does not load.
        Commands::Config(args) => {
            start_tracing(&GeneralConfig::default(), cli.log_level.as_deref())?;
            commands::config::execute(args, &cli.config, &writer).await
        }
        Commands::Workspace(args) => {
            start_tracing(&GeneralConfig::default(), cli.log_level.as_deref())?;
            commands::workspace::execute(args, &writer)
        }
    }
}

fn start_tracing(general: &GeneralConfig, log_level: Option<&str>) -> Result<(), CliError> {
    let mut general = general.clone();
    if let Some(level) = log_level {
        general.log_level = level.to_owned();
    }
    init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))
}

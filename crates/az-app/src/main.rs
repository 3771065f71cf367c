mod analyzer;
mod backend;
mod cancel;
mod config;
mod error;
mod events;
mod ingest;
mod job;
mod poller;

use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use crate::analyzer::Analyzer;
use crate::config::ClientConfig;
use crate::events::JobEvent;

#[derive(Parser)]
#[command(name = "az-app")]
#[command(about = "Submit corneal endothelium images for analysis and collect the results")]
#[command(version)]
struct Cli {
    /// Defaults to `analyze`.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the preset pipelines offered by the service.
    Models,

    /// Pair images with masks, run one analysis job and write the results archive.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct AnalyzeArgs {
    /// Directory of images to upload. Overrides AZ_INPUT_DIR.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Zip file to write. Overrides AZ_OUTPUT_ARCHIVE.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl AnalyzeArgs {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(input) = self.input {
            config.input_dir = Some(input);
        }
        if let Some(output) = self.output {
            config.output_archive = output;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = ClientConfig::load()?;

    match cli.command.unwrap_or_else(|| Commands::Analyze(AnalyzeArgs::default())) {
        Commands::Models => {
            let analyzer = Analyzer::new(config, None)?;
            for model in analyzer.list_models().await? {
                println!("{}", model);
            }
        }
        Commands::Analyze(args) => {
            args.apply(&mut config);
            analyze(config).await?;
        }
    }

    Ok(())
}

async fn analyze(config: ClientConfig) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let analyzer = Analyzer::new(config, Some(tx))?;

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::StateChanged { job_id, state } if state.is_complete() => {
                    info!("[{}] Job {:?}", job_id, state)
                }
                JobEvent::StateChanged { job_id, state } => {
                    info!("[{}] {:?}{}", job_id, state, if state.is_active() { "..." } else { "" })
                }
                JobEvent::Polled { job_id, status } => info!("[{}] Server reports {}", job_id, status),
                JobEvent::Resubmitting { job_id, attempt } => warn!("[{}] Resubmitting (attempt {})", job_id, attempt),
            }
        }
    });

    let (handle, token) = cancel::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling job");
            handle.cancel();
        }
    });

    let results = match analyzer.analyze(&token).await {
        Ok(results) => results,
        Err(e) => {
            if e.is_local() {
                error!("Nothing was sent: {}", e);
            } else {
                error!("{}", e);
            }
            return Err(e.into());
        }
    };

    if results.is_empty() {
        warn!("The service returned no results, {} not written", analyzer.output_archive().display());
        return Ok(());
    }

    analyzer.write_results(&results).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command_means_analyze() {
        let cli = Cli::try_parse_from(["az-app"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["az-app", "models"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Models)));
    }

    #[test]
    fn test_analyze_overrides_config() {
        let cli = Cli::try_parse_from(["az-app", "analyze", "--input", "Run/Images", "--output", "out.zip"]).unwrap();
        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze");
        };

        let mut config = ClientConfig::from_lookup(|_| None).unwrap();
        args.apply(&mut config);
        assert_eq!(config.input_dir, Some(PathBuf::from("Run/Images")));
        assert_eq!(config.output_archive, PathBuf::from("out.zip"));
    }

    #[test]
    fn test_help_and_unknown_commands() {
        let err = Cli::try_parse_from(["az-app", "--help"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["az-app", "upload"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }
}

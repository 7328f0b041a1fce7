//! layerscan CLI entry point
//!
//! Loads configuration, initializes logging and dispatches to the
//! subcommand handlers in [`commands`].

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use layerscan_core::config::{GeneralConfig, LayerscanConfig};

use crate::cli::{Cli, Commands, DEFAULT_CONFIG_PATH};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // config 명령은 설정 로딩 실패 자체를 보고해야 하므로 기본 로깅으로 시작합니다.
    if let Commands::Config(args) = cli.command {
        let general = GeneralConfig {
            log_level: cli.log_level.unwrap_or_else(|| "warn".to_owned()),
            ..GeneralConfig::default()
        };
        init_logging(&general)?;
        return commands::config::execute(args, &config_path, &writer).await;
    }

    let mut config = load_config(cli.config.as_deref(), &config_path).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    config.validate()?;
    init_logging(&config.general)?;
    layerscan_core::metrics::describe_all();

    tracing::debug!(config = %config_path.display(), "layerscan starting");

    match cli.command {
        Commands::Fs(args) => {
            commands::scan::execute(commands::scan::TargetKind::Filesystem, args, config, &writer)
                .await
        }
        Commands::Repo(args) => {
            commands::scan::execute(commands::scan::TargetKind::Repository, args, config, &writer)
                .await
        }
        Commands::Image(args) => {
            commands::scan::execute(commands::scan::TargetKind::Image, args, config, &writer).await
        }
        Commands::Sbom(args) => {
            commands::scan::execute(commands::scan::TargetKind::Sbom, args, config, &writer).await
        }
        Commands::Cache(args) => commands::cache::execute(args, config, &writer).await,
        Commands::Analyzers => commands::analyzers::execute(&config, &writer),
        Commands::Config(_) => Ok(()),
    }
}

/// An explicit `--config` must exist; the default path may be absent.
async fn load_config(
    explicit: Option<&Path>,
    config_path: &Path,
) -> Result<LayerscanConfig, CliError> {
    let config = match explicit {
        Some(path) => LayerscanConfig::load(path).await?,
        None => LayerscanConfig::load_or_default(config_path).await?,
    };
    Ok(config)
}

fn init_logging(general: &GeneralConfig) -> Result<(), CliError> {
    logging::init_tracing(general).map_err(|e| CliError::Config(format!("{e:#}")))
}

//! devloop - incremental Java to JavaScript dev builds
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use devloop::cli::{Cli, Commands};
use devloop::config::{Config, ConfigManager};
use devloop::error::{DevloopError, DevloopResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DevloopResult<()> {
    let cli = Cli::parse();

    // --config wins, then the nearest devloop.toml above the working directory
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| DevloopError::io("getting current directory", e))?;
            let path = ConfigManager::find_local_config(&cwd)
                .unwrap_or_else(|| cwd.join(devloop::config::CONFIG_FILE_NAME));
            ConfigManager::with_path(path)
        }
    };

    // An explicit --config must exist unless we are about to create it
    if cli.config.is_some()
        && !config_manager.path().exists()
        && !matches!(cli.command, Commands::Config(_))
    {
        return Err(DevloopError::ConfigNotFound(config_manager.path().to_path_buf()));
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, &config);
    debug!("Using config: {}", config_manager.path().display());
    devloop::ui::init_theme();

    match cli.command {
        Commands::Watch(args) => devloop::cli::commands::watch(args, &config).await,
        Commands::Build(args) => devloop::cli::commands::build(args, &config).await,
        Commands::Test(args) => devloop::cli::commands::test(args, &config).await,
        Commands::Cache(args) => devloop::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            devloop::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn (status lines only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("devloop=warn"),
        1 => EnvFilter::new("devloop=info"),
        _ => EnvFilter::new("devloop=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    }
}

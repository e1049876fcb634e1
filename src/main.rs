//! loadforge - custom k6 binary build service
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use loadforge::cli::{Cli, Commands, LogFormat};
use loadforge::config::{Config, ConfigManager};
use loadforge::error::ForgeResult;
use std::process::ExitCode;
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

async fn run() -> ForgeResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(&cli, &config);

    // Dispatch to command
    match cli.command {
        Commands::Server(args) => loadforge::cli::commands::server(args, &config).await,
        Commands::Store(args) => loadforge::cli::commands::store(args, &config).await,
        Commands::Remote(args) => loadforge::cli::commands::remote(args, &config).await,
        Commands::Local(args) => loadforge::cli::commands::local(args, &config).await,
    }
}

/// Logs go to stderr; stdout carries command output
fn init_logging(cli: &Cli, config: &Config) {
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::new(format!("loadforge={level}"));

    let json = match cli.log_format {
        Some(format) => format == LogFormat::Json,
        None => config.log.format.eq_ignore_ascii_case("json"),
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

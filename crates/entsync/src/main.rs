mod cli;
mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use entsync_config::{Config, ConfigError, LoggingConfig};
use entsync_core::Engine;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Config errors surface later, from the commands that need the config
    let path = config_file(&cli.global);
    let loaded = entsync_config::load_config_from(&path);
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(cli.global.verbose, &logging);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli, path, loaded).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(entsync_config::config_path)
}

fn init_tracing(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(
    cli: Cli,
    path: PathBuf,
    loaded: Result<Config, ConfigError>,
) -> Result<(), CliError> {
    match cli.command {
        // Config commands work even when the file is broken
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global, &path, loaded),

        Command::Load(args) => {
            let config = loaded.map_err(|source| CliError::Config {
                path: path.display().to_string(),
                source,
            })?;
            let engine = Engine::new(config.engine_config());

            tracing::debug!(cache_key = %args.cache_key, "dispatching load");
            commands::load::handle(args, &engine, &cli.global).await
        }
    }
}

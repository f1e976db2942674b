//! Config subcommand handlers.

use std::path::Path;

use entsync_config::{Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

fn config_err(path: &Path, source: ConfigError) -> CliError {
    CliError::Config {
        path: path.display().to_string(),
        source,
    }
}

pub fn handle(
    args: ConfigArgs,
    global: &GlobalOpts,
    path: &Path,
    loaded: Result<Config, ConfigError>,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let config = loaded.map_err(|e| config_err(path, e))?;
            let rendered = match global.output {
                OutputFormat::Table => toml::to_string_pretty(&config)?,
                OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                OutputFormat::JsonCompact => serde_json::to_string(&config)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            entsync_config::save_config_to(&Config::default(), path)
                .map_err(|e| config_err(path, e))?;
            output::print_summary(
                &format!("Wrote {}", path.display()),
                output::should_color(&global.color),
                global.quiet,
            );
            Ok(())
        }
    }
}

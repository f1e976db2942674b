//! Clap derive structures for the `entsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// entsync -- drive the entity cache engine against local fixtures
#[derive(Debug, Parser)]
#[command(
    name = "entsync",
    version,
    about = "Load, slice and inspect cached entity collections",
    long_about = "Runs the entsync cache engine against a JSON fixture file standing in\n\
        for a remote API, and prints the slice a loader would select.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config path)
    #[arg(long, env = "ENTSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// How selections and config are printed
    #[arg(
        long,
        short = 'o',
        env = "ENTSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Color the stderr summary line
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log more engine activity to stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print nothing but errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Rendering Enums ──────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// One row per entity, one column per field
    Table,
    /// Indented JSON array
    Json,
    /// JSON array on a single line
    JsonCompact,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Color when stderr is a terminal and NO_COLOR is unset
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a collection slice from a fixture through the cache engine
    #[command(alias = "l")]
    Load(LoadArgs),

    /// Inspect or initialize the configuration file
    Config(ConfigArgs),
}

// ── Load ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// JSON fixture: an array of entities, or an object keyed by cache key
    pub fixture: PathBuf,

    /// Cache key of the collection
    #[arg(long, short = 'k')]
    pub cache_key: String,

    /// Param names that identify a slice (repeatable)
    #[arg(long = "index-by", value_name = "FIELD")]
    pub index_by: Vec<String>,

    /// Fields forming the entity identity (repeatable, default: id)
    #[arg(long = "unique-id", value_name = "FIELD")]
    pub unique_id: Vec<String>,

    /// Call parameter as key=value; values parse as JSON, else string
    #[arg(long = "param", short = 'P', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Replace the slice instead of merging into it
    #[arg(long)]
    pub no_cache: bool,

    /// Sort the selection by this field
    #[arg(long, value_name = "FIELD")]
    pub sort_by: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort_by")]
    pub desc: bool,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_parse_as_json_or_string() {
        assert_eq!(parse_param("limit=5").unwrap(), ("limit".into(), json!(5)));
        assert_eq!(
            parse_param("region=us-east").unwrap(),
            ("region".into(), json!("us-east"))
        );
        assert_eq!(parse_param("q=a=b").unwrap(), ("q".into(), json!("a=b")));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

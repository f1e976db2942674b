//! Configuration for entsync consumers.
//!
//! TOML file + environment layering and translation to
//! `entsync_core::EngineConfig`. The core never touches the filesystem;
//! binaries load a [`Config`] here and hand the engine section over.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use entsync_core::EngineConfig;

/// Environment prefix; nested keys use `__`, e.g.
/// `ENTSYNC__ENGINE__SELECTOR_CAPACITY=64`.
pub const ENV_PREFIX: &str = "ENTSYNC__";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["fmt", "json"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("could not encode configuration: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("could not read configuration: {0}")]
    Figment(Box<figment::Error>),

    #[error("config file I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Fallback filter when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_level")]
    pub level: String,

    /// `fmt` (human) or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "warn".into()
}
fn default_format() -> String {
    "fmt".into()
}

impl Config {
    /// Reject values the engine or the log setup cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.selector_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "engine.selector_capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation {
                field: "logging.level".into(),
                reason: format!(
                    "expected one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    self.logging.level
                ),
            });
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Validation {
                field: "logging.format".into(),
                reason: format!("expected 'fmt' or 'json', got '{}'", self.logging.format),
            });
        }
        Ok(())
    }

    /// The engine section, ready to hand to `Engine::new`.
    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone()
    }
}

// ── Location ────────────────────────────────────────────────────────

/// Platform config location for `config.toml`, or `~/.config/entsync`
/// when no home directory can be resolved.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "entsync", "entsync").map_or_else(
        || home_config_dir().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn home_config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(".config")
        .join("entsync")
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load and validate the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate: defaults, then `path` (if it exists), then
/// `ENTSYNC__*` environment variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a broken or invalid file yields defaults.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

/// Write `cfg` to [`config_path`], returning where it went.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use entsync_config::ConfigError;
use entsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const LOAD_FAILED: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Fixtures ─────────────────────────────────────────────────────
    #[error("Cannot read fixture {path}")]
    #[diagnostic(
        code(entsync::fixture),
        help("Fixtures are JSON arrays of objects, or objects keyed by cache key.")
    )]
    Fixture {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Fixture has no collection '{cache_key}'")]
    #[diagnostic(
        code(entsync::not_found),
        help("Available collections: {available}")
    )]
    CollectionNotFound { cache_key: String, available: String },

    // ── Engine ───────────────────────────────────────────────────────
    #[error("Loading '{cache_key}' failed: {message}")]
    #[diagnostic(code(entsync::load_failed))]
    LoadFailed { cache_key: String, message: String },

    #[error("{entity_type} '{identifier}' not found")]
    #[diagnostic(code(entsync::not_found))]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Engine error: {message}")]
    #[diagnostic(code(entsync::engine))]
    Engine { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(entsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error")]
    #[diagnostic(
        code(entsync::config),
        help("Check the config file ({path}) and ENTSYNC__* environment variables.")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Config file already exists at {path}")]
    #[diagnostic(code(entsync::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(entsync::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(entsync::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config { .. } | Self::ConfigExists { .. } => exit_code::CONFIG,
            Self::CollectionNotFound { .. } | Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::LoadFailed { .. } => exit_code::LOAD_FAILED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingCacheKey { action } => Self::Validation {
                field: "cache-key".into(),
                reason: format!("action '{action}' has no cache key"),
            },
            CoreError::DuplicateAction { name } => Self::Validation {
                field: "action".into(),
                reason: format!("'{name}' registered twice"),
            },
            CoreError::Config { message } => Self::Validation {
                field: "engine".into(),
                reason: message,
            },
            CoreError::NotFound {
                entity_type,
                identifier,
            } => Self::NotFound {
                entity_type,
                identifier,
            },
            other @ (CoreError::OperationFailed { .. }
            | CoreError::Api { .. }
            | CoreError::InvalidEntity { .. }
            | CoreError::Selector { .. }
            | CoreError::Internal(_)) => Self::Engine {
                message: other.to_string(),
            },
        }
    }
}

// ── Core error types ──
//
// Configuration errors are programming mistakes and always reach the
// caller. Everything else is recoverable and is reported through the
// notification sink by the orchestration layer.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Action '{action}' has no cacheKey configured")]
    MissingCacheKey { action: String },

    #[error("Action '{name}' is already registered in this set")]
    DuplicateAction { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation failed: {message}")]
    OperationFailed { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Cached entity under '{cache_key}' is not an object: {found}")]
    InvalidEntity { cache_key: String, found: String },

    #[error("Selector failed for '{cache_key}': {message}")]
    Selector { cache_key: String, message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for the most common failure raised by loader callbacks.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Whether this error is a programming mistake that must never be
    /// swallowed by the orchestration layer.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingCacheKey { .. } | Self::DuplicateAction { .. } | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(
            CoreError::MissingCacheKey {
                action: "list".into()
            }
            .is_configuration()
        );
        assert!(
            CoreError::DuplicateAction {
                name: "create".into()
            }
            .is_configuration()
        );
        assert!(!CoreError::operation("boom").is_configuration());
        assert!(
            !CoreError::Selector {
                cache_key: "pods".into(),
                message: "bad shape".into()
            }
            .is_configuration()
        );
    }

    #[test]
    fn display_mentions_action_name() {
        let err = CoreError::MissingCacheKey {
            action: "list".into(),
        };
        assert_eq!(err.to_string(), "Action 'list' has no cacheKey configured");
    }
}

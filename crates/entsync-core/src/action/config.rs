// ── Action configuration ──

use crate::error::CoreError;
use crate::notify::{ErrorMessage, SuccessMessage};

/// Identifier field used when none is configured.
pub const DEFAULT_UNIQUE_IDENTIFIER: &str = "id";

/// Declarative configuration attached to an [`Action`](super::Action).
///
/// Immutable once published; refine it through
/// [`Action::update_config`](super::Action::update_config), which swaps
/// in a freshly merged copy.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Logical entity collection this action reads/writes. Required at call time.
    pub cache_key: Option<String>,
    /// Fields that uniquely identify an entity within the collection.
    pub unique_identifier: Vec<String>,
    /// Call-parameter fields that partition the collection into slices.
    pub index_by: Vec<String>,
    /// Merge list results into the slice (`true`) or replace it (`false`).
    pub cache: bool,
    pub entity_name: Option<String>,
    pub success_message: Option<SuccessMessage>,
    pub error_message: Option<ErrorMessage>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            cache_key: None,
            unique_identifier: vec![DEFAULT_UNIQUE_IDENTIFIER.to_owned()],
            index_by: Vec::new(),
            cache: true,
            entity_name: None,
            success_message: None,
            error_message: None,
        }
    }
}

impl ActionConfig {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: Some(cache_key.into()),
            ..Self::default()
        }
    }

    pub fn unique_identifier<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_identifier = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn index_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_by = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn success_message(mut self, message: impl Into<SuccessMessage>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<ErrorMessage>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// The configured cache key, or [`CoreError::MissingCacheKey`].
    pub fn require_cache_key(&self, action: &str) -> Result<&str, CoreError> {
        self.cache_key
            .as_deref()
            .ok_or_else(|| CoreError::MissingCacheKey {
                action: action.to_owned(),
            })
    }

    /// Human-readable entity label for notifications.
    pub fn display_name(&self) -> &str {
        self.entity_name
            .as_deref()
            .or(self.cache_key.as_deref())
            .unwrap_or("data")
    }

    /// Shallow merge: every field set in `patch` replaces ours.
    pub fn merged(&self, patch: &ActionConfigPatch) -> Self {
        Self {
            cache_key: patch.cache_key.clone().or_else(|| self.cache_key.clone()),
            unique_identifier: patch
                .unique_identifier
                .clone()
                .unwrap_or_else(|| self.unique_identifier.clone()),
            index_by: patch
                .index_by
                .clone()
                .unwrap_or_else(|| self.index_by.clone()),
            cache: patch.cache.unwrap_or(self.cache),
            entity_name: patch
                .entity_name
                .clone()
                .or_else(|| self.entity_name.clone()),
            success_message: patch
                .success_message
                .clone()
                .or_else(|| self.success_message.clone()),
            error_message: patch
                .error_message
                .clone()
                .or_else(|| self.error_message.clone()),
        }
    }
}

/// A partial [`ActionConfig`]; unset fields leave the target untouched.
#[derive(Debug, Clone, Default)]
pub struct ActionConfigPatch {
    pub cache_key: Option<String>,
    pub unique_identifier: Option<Vec<String>>,
    pub index_by: Option<Vec<String>>,
    pub cache: Option<bool>,
    pub entity_name: Option<String>,
    pub success_message: Option<SuccessMessage>,
    pub error_message: Option<ErrorMessage>,
}

impl ActionConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    pub fn unique_identifier<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_identifier = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn index_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_by = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn success_message(mut self, message: impl Into<SuccessMessage>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<ErrorMessage>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

impl From<ActionConfig> for ActionConfigPatch {
    fn from(config: ActionConfig) -> Self {
        Self {
            cache_key: config.cache_key,
            unique_identifier: Some(config.unique_identifier),
            index_by: Some(config.index_by),
            cache: Some(config.cache),
            entity_name: config.entity_name,
            success_message: config.success_message,
            error_message: config.error_message,
        }
    }
}

// ── Action registry ──
//
// Binds the actions of one entity collection to a shared configuration.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::{Action, ActionConfigPatch};
use crate::error::CoreError;

/// A group of related actions sharing one configuration policy.
///
/// The shared config is merged into each action as it is added and wins
/// over the action's own values for overlapping fields.
#[derive(Debug, Default)]
pub struct ActionsSet {
    common: ActionConfigPatch,
    actions: IndexMap<String, Arc<Action>>,
}

impl ActionsSet {
    pub fn new(common: ActionConfigPatch) -> Self {
        Self {
            common,
            actions: IndexMap::new(),
        }
    }

    /// Register `action`. Fails if an action with the same name exists.
    pub fn add(&mut self, action: Action) -> Result<Arc<Action>, CoreError> {
        if self.actions.contains_key(action.name()) {
            return Err(CoreError::DuplicateAction {
                name: action.name().to_owned(),
            });
        }
        action.update_config(&self.common);
        debug!(
            action = action.name(),
            cache_key = ?action.config().cache_key,
            "action registered"
        );
        let action = Arc::new(action);
        self.actions
            .insert(action.name().to_owned(), Arc::clone(&action));
        Ok(action)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    pub fn common_config(&self) -> &ActionConfigPatch {
        &self.common
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ── Runtime engine configuration ──
//
// Tuning knobs for an `Engine`. The core never reads configuration files;
// `entsync-config` (or the embedding application) builds this and hands it in.

use serde::{Deserialize, Serialize};

use crate::selector::DEFAULT_SELECTOR_CAPACITY;

/// Configuration for one [`Engine`](crate::Engine) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of memoized selector results.
    pub selector_capacity: usize,
    /// Default for loaders: only load when explicitly asked to.
    pub load_on_demand: bool,
    /// Default for loaders: toggle the loading flag around fetches.
    pub loading_feedback: bool,
    /// Wipe the cache whenever the session scope (tenant/region) changes.
    ///
    /// Off by default: cached data is not namespaced by scope and loaders
    /// simply re-evaluate on a scope change.
    pub clear_on_scope_change: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selector_capacity: DEFAULT_SELECTOR_CAPACITY,
            load_on_demand: false,
            loading_feedback: true,
            clear_on_scope_change: false,
        }
    }
}

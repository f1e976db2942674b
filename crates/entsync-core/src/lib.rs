//! Normalized entity cache and data-synchronization engine.
//!
//! Sits between data-fetching callbacks and the consumers that render
//! their results:
//!
//! - **[`Action`]** / **[`ActionsSet`]**: Typed units of work (list,
//!   create, update, delete, custom) wrapping an async callback plus
//!   declarative cache configuration. After each successful call an action
//!   applies exactly one [`CacheMutation`] chosen by its kind.
//!
//! - **[`CacheStore`]**: Per-cache-key entity arrays keyed by partial
//!   "indexed params" (slices), plus fetched-params sets and loading flags.
//!   All writes go through pure reducers.
//!
//! - **[`SelectorCache`]**: Version-validated memo of filtered, sorted
//!   and transformed selections.
//!
//! - **[`DataLoader`]**: Read path: decides whether the cache can answer
//!   or a fetch is needed, and exposes data plus a loading flag.
//!
//! - **[`DataUpdater`]**: Write path: serializes mutations issued
//!   through one handle in strict FIFO order.
//!
//! - **[`Engine`]**: Facade owning one store, selector memo, notifier and
//!   session scope. Loaders and updaters are vended from it.

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod notify;
pub mod params;
pub mod selector;
pub mod session;
pub mod store;
pub mod stream;
pub mod updater;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{
    Action, ActionConfig, ActionConfigPatch, ActionKind, ActionsSet, DEFAULT_UNIQUE_IDENTIFIER,
    PostProcessContext,
};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::CoreError;
pub use loader::{DataLoader, LoadSource, LoaderOptions, LoaderState};
pub use notify::{ErrorMessage, Notifier, Severity, SuccessMessage, TracingNotifier};
pub use params::{ALL, IndexedParams, Params, SortDirection, SortSpec};
pub use selector::{SelectorCache, SelectorQuery, SelectorTransform};
pub use session::SessionScope;
pub use store::{CacheMutation, CacheStore};
pub use stream::ChangeStream;
pub use updater::{DataUpdater, UpdaterOptions};

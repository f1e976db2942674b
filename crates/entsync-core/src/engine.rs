// ── Engine facade ──
//
// Owns one cache store, its selector memo, the notification sink and the
// session scope. Loaders and updaters are vended from here so that every
// consumer shares the same injected instances.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::action::Action;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::loader::{DataLoader, LoadSource, LoaderOptions};
use crate::notify::{Notifier, Severity, TracingNotifier};
use crate::params::Params;
use crate::selector::{SelectorCache, SelectorQuery};
use crate::session::SessionScope;
use crate::store::CacheStore;
use crate::stream::ChangeStream;
use crate::updater::{DataUpdater, UpdaterOptions};

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Independent engines never
/// share state, which keeps tests isolated.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<CacheStore>,
    selectors: SelectorCache,
    notifier: Arc<dyn Notifier>,
    scope: watch::Sender<SessionScope>,
}

impl Engine {
    /// Create an engine that reports through [`TracingNotifier`].
    pub fn new(config: EngineConfig) -> Self {
        Self::with_notifier(config, TracingNotifier)
    }

    pub fn with_notifier(config: EngineConfig, notifier: impl Notifier) -> Self {
        let (scope, _) = watch::channel(SessionScope::default());
        let selectors = SelectorCache::new(config.selector_capacity);
        Self {
            inner: Arc::new(EngineInner {
                config,
                store: Arc::new(CacheStore::new()),
                selectors,
                notifier: Arc::new(notifier),
                scope,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn selectors(&self) -> &SelectorCache {
        &self.inner.selectors
    }

    /// Memoized read of `query` from the store.
    pub fn select(&self, query: &SelectorQuery) -> Result<Arc<Vec<Value>>, CoreError> {
        self.inner.selectors.select(&self.inner.store, query)
    }

    pub fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.inner.notifier.notify(title, message, severity);
    }

    pub(crate) fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    // ── Session scope ────────────────────────────────────────────────

    pub fn scope(&self) -> SessionScope {
        self.inner.scope.borrow().clone()
    }

    pub fn subscribe_scope(&self) -> ChangeStream<SessionScope> {
        ChangeStream::new(self.inner.scope.subscribe())
    }

    pub(crate) fn scope_receiver(&self) -> watch::Receiver<SessionScope> {
        self.inner.scope.subscribe()
    }

    /// Switch tenant/region. Returns `false` if the scope is unchanged.
    pub fn set_scope(&self, scope: SessionScope) -> bool {
        let changed = self.inner.scope.send_if_modified(|current| {
            if *current == scope {
                false
            } else {
                *current = scope.clone();
                true
            }
        });
        if changed {
            info!(scope = %scope, "session scope changed");
            if self.inner.config.clear_on_scope_change {
                self.inner.store.clear_all();
                self.inner.selectors.clear();
                debug!("cache cleared for new scope");
            }
        }
        changed
    }

    // ── Orchestration ────────────────────────────────────────────────

    /// Create a read-path subscription. Nothing is fetched until
    /// [`DataLoader::start`] or [`DataLoader::load`] runs.
    pub fn loader(
        &self,
        source: impl Into<LoadSource>,
        params: Params,
        options: LoaderOptions,
    ) -> DataLoader {
        DataLoader::new(self.clone(), source.into(), params, options)
    }

    /// Create a write-path handle around a plain updater function.
    pub fn updater<F, Fut>(&self, updater: F, options: UpdaterOptions) -> DataUpdater
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(bool, Value), CoreError>> + Send + 'static,
    {
        DataUpdater::new(
            Arc::new(move |params| updater(params).boxed()),
            self.notifier(),
            options,
        )
    }

    /// Create a write-path handle that runs `action` against this engine's
    /// store. The action's entity name and messages fill any option left
    /// unset.
    pub fn action_updater(&self, action: Arc<Action>, options: UpdaterOptions) -> DataUpdater {
        let config = action.config();
        let options = UpdaterOptions {
            title: options
                .title
                .or_else(|| Some(config.display_name().to_owned())),
            error_message: options.error_message.or_else(|| config.error_message.clone()),
            success_message: options
                .success_message
                .or_else(|| config.success_message.clone()),
            ..options
        };
        DataUpdater::new(
            action.into_updater(Arc::clone(&self.inner.store)),
            self.notifier(),
            options,
        )
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

// ── Read path ──
//
// A `DataLoader` is one consumer's subscription to a slice of data. It
// decides on every evaluation whether the cache can answer or a fetch is
// needed, and exposes the current selection plus a loading flag.
//
// Cache-backed loaders (action sources) share the store's loading flag for
// their cache key. Function-backed loaders keep their result locally; that
// local state stops updating once the loader is torn down.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action::Action;
use crate::action::post_process::normalize;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::notify::{ErrorMessage, Severity};
use crate::params::{IndexedParams, Params, SortSpec};
use crate::selector::{SelectorQuery, SelectorTransform};
use crate::stream::ChangeStream;

/// A plain loader function: `(params, refetch) -> result`.
pub type LoaderFn =
    Arc<dyn Fn(Params, bool) -> BoxFuture<'static, Result<Value, CoreError>> + Send + Sync>;

/// Where a loader's data comes from.
#[derive(Clone)]
pub enum LoadSource {
    /// A cache-backed action; results land in the shared store.
    Action(Arc<Action>),
    /// A function whose result is held by the loader itself.
    Function(LoaderFn),
}

impl LoadSource {
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Params, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::Function(Arc::new(move |params, refetch| f(params, refetch).boxed()))
    }
}

impl From<Arc<Action>> for LoadSource {
    fn from(action: Arc<Action>) -> Self {
        Self::Action(action)
    }
}

impl fmt::Debug for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Action").field(&action.name()).finish(),
            Self::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// Per-loader behaviour. Unset flags fall back to the engine config.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    pub load_on_demand: Option<bool>,
    pub loading_feedback: Option<bool>,
    /// Params that identify the slice for function sources. Empty means
    /// every param does.
    pub index_by: Vec<String>,
    pub sort: Option<SortSpec>,
    pub transform: Option<SelectorTransform>,
    pub error_message: Option<ErrorMessage>,
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_on_demand(mut self, on: bool) -> Self {
        self.load_on_demand = Some(on);
        self
    }

    pub fn loading_feedback(mut self, on: bool) -> Self {
        self.loading_feedback = Some(on);
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

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn transform(mut self, transform: SelectorTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn error_message(mut self, message: impl Into<ErrorMessage>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Snapshot published to loader subscribers.
#[derive(Debug, Clone, Default)]
pub struct LoaderState {
    pub data: Arc<Vec<Value>>,
    pub loading: bool,
    /// Message of the last failed load, cleared by the next success.
    pub error: Option<String>,
}

#[derive(Default)]
struct LocalSlice {
    data: Option<Arc<Vec<Value>>>,
    indexed: Option<IndexedParams>,
    loading: bool,
    error: Option<String>,
}

struct CurrentParams {
    params: Params,
    indexed: IndexedParams,
}

/// One consumer's read-path subscription. Cheaply cloneable.
#[derive(Clone)]
pub struct DataLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    engine: Engine,
    source: LoadSource,
    options: LoaderOptions,
    load_on_demand: bool,
    loading_feedback: bool,
    current: Mutex<CurrentParams>,
    local: Mutex<LocalSlice>,
    state: watch::Sender<LoaderState>,
    cancel: CancellationToken,
    selector_retry_spent: AtomicBool,
}

impl DataLoader {
    pub(crate) fn new(engine: Engine, source: LoadSource, params: Params, options: LoaderOptions) -> Self {
        let load_on_demand = options
            .load_on_demand
            .unwrap_or(engine.config().load_on_demand);
        let loading_feedback = options
            .loading_feedback
            .unwrap_or(engine.config().loading_feedback);
        let indexed = index_params(&source, &options, &params);
        let (state, _) = watch::channel(LoaderState::default());
        Self {
            inner: Arc::new(LoaderInner {
                engine,
                source,
                options,
                load_on_demand,
                loading_feedback,
                current: Mutex::new(CurrentParams { params, indexed }),
                local: Mutex::new(LocalSlice::default()),
                state,
                cancel: CancellationToken::new(),
                selector_retry_spent: AtomicBool::new(false),
            }),
        }
    }

    /// Initial evaluation. Loads unless the loader is on-demand.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.load_on_demand {
            self.publish();
            Ok(())
        } else {
            self.load(false).await
        }
    }

    /// Replace the call params. Re-evaluates only when the indexed params
    /// changed structurally; returns whether they did.
    pub async fn set_params(&self, params: Params) -> Result<bool, CoreError> {
        let indexed = index_params(&self.inner.source, &self.inner.options, &params);
        let changed = {
            let mut current = self.inner.lock_current();
            let changed = current.indexed != indexed;
            current.params = params;
            current.indexed = indexed;
            changed
        };
        if changed {
            self.inner.selector_retry_spent.store(false, Ordering::SeqCst);
            if !self.inner.load_on_demand {
                self.load(false).await?;
            }
        }
        Ok(changed)
    }

    pub fn params(&self) -> Params {
        self.inner.lock_current().params.clone()
    }

    pub fn indexed(&self) -> IndexedParams {
        self.inner.lock_current().indexed.clone()
    }

    /// Evaluate: fetch if `refetch` is set, the selection is empty, or the
    /// current indexed params were never fetched; otherwise serve from
    /// cache.
    ///
    /// Fetch failures are notified and leave the previous data in place.
    /// Only misconfiguration is returned as an error.
    pub async fn load(&self, refetch: bool) -> Result<(), CoreError> {
        let (params, indexed) = {
            let current = self.inner.lock_current();
            (current.params.clone(), current.indexed.clone())
        };

        let mut refetch = refetch;
        let selection = match self.try_selection(&indexed) {
            Ok(selection) => selection,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                self.report_selector_error(&e);
                if self.claim_selector_retry() {
                    refetch = true;
                }
                Arc::default()
            }
        };
        let required = refetch || selection.is_empty() || !self.has_fetched(&indexed)?;
        if !required {
            debug!(source = ?self.inner.source, indexed = %indexed, "served from cache");
            self.publish();
            return Ok(());
        }

        let loading = LoadingGuard::arm(self)?;
        let outcome = self.fetch(params.clone(), indexed, refetch).await;
        drop(loading);

        match outcome {
            Ok(()) => {
                self.record_error(None);
                self.publish();
                Ok(())
            }
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                warn!(source = ?self.inner.source, error = %e, "load failed");
                self.report(&e, &params);
                self.record_error(Some(e.to_string()));
                self.publish();
                Ok(())
            }
        }
    }

    /// Explicit refetch.
    pub async fn reload(&self) -> Result<(), CoreError> {
        self.load(true).await
    }

    /// The current selection.
    ///
    /// A failing selector is notified and yields an empty selection; the
    /// first such failure also schedules one forced refetch when a runtime
    /// is available.
    pub fn data(&self) -> Arc<Vec<Value>> {
        let indexed = self.indexed();
        match self.try_selection(&indexed) {
            Ok(selection) => selection,
            Err(e) => {
                self.report_selector_error(&e);
                if self.claim_selector_retry() {
                    if let Ok(handle) = Handle::try_current() {
                        let this = self.clone();
                        handle.spawn(async move {
                            if let Err(e) = this.load(true).await {
                                warn!(error = %e, "selector recovery refetch failed");
                            }
                        });
                    }
                }
                Arc::default()
            }
        }
    }

    pub fn loading(&self) -> bool {
        match &self.inner.source {
            LoadSource::Action(action) => action
                .config()
                .cache_key
                .as_deref()
                .is_some_and(|key| self.inner.engine.store().loading(key)),
            LoadSource::Function(_) => self.inner.lock_local().loading,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> ChangeStream<LoaderState> {
        ChangeStream::new(self.inner.state.subscribe())
    }

    /// Re-evaluate whenever the session scope changes, until torn down.
    ///
    /// Function sources refetch on every scope change; action sources
    /// refetch only if the store no longer answers for their slice.
    pub async fn watch_scope(&self) -> Result<(), CoreError> {
        let mut scope = self.inner.engine.scope_receiver();
        scope.borrow_and_update();
        loop {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => return Ok(()),
                changed = scope.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let current = scope.borrow_and_update().clone();
                    debug!(scope = %current, "scope changed, re-evaluating");
                    if matches!(self.inner.source, LoadSource::Function(_)) {
                        // Local results belong to the previous scope.
                        self.inner.lock_local().indexed = None;
                    }
                    if !self.inner.load_on_demand {
                        self.load(false).await?;
                    }
                }
            }
        }
    }

    /// Stop publishing subscriber-local state. Fetches already running
    /// still complete and still write to the shared store.
    pub fn teardown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn try_selection(&self, indexed: &IndexedParams) -> Result<Arc<Vec<Value>>, CoreError> {
        match &self.inner.source {
            LoadSource::Action(action) => {
                let config = action.config();
                let cache_key = config.require_cache_key(action.name())?;
                let mut query = SelectorQuery::new(cache_key, indexed.clone());
                query.sort.clone_from(&self.inner.options.sort);
                query.transform.clone_from(&self.inner.options.transform);
                self.inner.engine.select(&query)
            }
            LoadSource::Function(_) => Ok(self.inner.lock_local().data.clone().unwrap_or_default()),
        }
    }

    fn has_fetched(&self, indexed: &IndexedParams) -> Result<bool, CoreError> {
        match &self.inner.source {
            LoadSource::Action(action) => {
                let config = action.config();
                let cache_key = config.require_cache_key(action.name())?;
                Ok(self.inner.engine.store().has_fetched(cache_key, indexed))
            }
            LoadSource::Function(_) => {
                Ok(self.inner.lock_local().indexed.as_ref() == Some(indexed))
            }
        }
    }

    async fn fetch(&self, params: Params, indexed: IndexedParams, refetch: bool) -> Result<(), CoreError> {
        match &self.inner.source {
            LoadSource::Action(action) => {
                action
                    .call_with(self.inner.engine.store(), params, refetch)
                    .await?;
                Ok(())
            }
            LoadSource::Function(f) => {
                let result = f(params, refetch).await?;
                if !self.inner.cancel.is_cancelled() {
                    let mut local = self.inner.lock_local();
                    local.data = Some(Arc::new(normalize(&result)));
                    local.indexed = Some(indexed);
                }
                Ok(())
            }
        }
    }

    fn set_loading(&self, loading: bool) -> Result<(), CoreError> {
        if !self.inner.loading_feedback {
            return Ok(());
        }
        match &self.inner.source {
            LoadSource::Action(action) => {
                let config = action.config();
                let cache_key = config.require_cache_key(action.name())?;
                self.inner.engine.store().set_loading(cache_key, loading);
            }
            LoadSource::Function(_) => {
                if self.inner.cancel.is_cancelled() {
                    return Ok(());
                }
                self.inner.lock_local().loading = loading;
            }
        }
        self.publish();
        Ok(())
    }

    fn record_error(&self, error: Option<String>) {
        if !self.inner.cancel.is_cancelled() {
            self.inner.lock_local().error = error;
        }
    }

    /// Push a fresh snapshot to subscribers.
    fn publish(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let indexed = self.indexed();
        let data = self.try_selection(&indexed).unwrap_or_default();
        let loading = self.loading();
        let error = self.inner.lock_local().error.clone();
        self.inner.state.send_replace(LoaderState {
            data,
            loading,
            error,
        });
    }

    fn claim_selector_retry(&self) -> bool {
        !self.inner.selector_retry_spent.swap(true, Ordering::SeqCst)
    }

    fn title(&self) -> String {
        match &self.inner.source {
            LoadSource::Action(action) => action.config().display_name().to_owned(),
            LoadSource::Function(_) => "Data".to_owned(),
        }
    }

    fn report(&self, err: &CoreError, params: &Params) {
        let configured = match &self.inner.source {
            LoadSource::Action(action) => action.config().error_message.clone(),
            LoadSource::Function(_) => None,
        };
        let message = self
            .inner
            .options
            .error_message
            .as_ref()
            .or(configured.as_ref())
            .map_or_else(|| err.to_string(), |m| m.render(err, params));
        self.inner
            .engine
            .notify(&self.title(), &message, Severity::Error);
    }

    fn report_selector_error(&self, err: &CoreError) {
        warn!(source = ?self.inner.source, error = %err, "selector failed");
        self.inner
            .engine
            .notify(&self.title(), &err.to_string(), Severity::Error);
    }
}

/// Holds the loading flag up for one fetch and lowers it on drop, so an
/// aborted `load` cannot leave the shared flag raised.
struct LoadingGuard<'a> {
    loader: &'a DataLoader,
}

impl<'a> LoadingGuard<'a> {
    fn arm(loader: &'a DataLoader) -> Result<Option<Self>, CoreError> {
        if !loader.inner.loading_feedback {
            return Ok(None);
        }
        loader.set_loading(true)?;
        Ok(Some(Self { loader }))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.loader.set_loading(false) {
            warn!(error = %e, "could not reset loading flag");
        }
    }
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("source", &self.inner.source)
            .field("indexed", &self.indexed())
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}

impl LoaderInner {
    fn lock_current(&self) -> std::sync::MutexGuard<'_, CurrentParams> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_local(&self) -> std::sync::MutexGuard<'_, LocalSlice> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn index_params(source: &LoadSource, options: &LoaderOptions, params: &Params) -> IndexedParams {
    match source {
        LoadSource::Action(action) => IndexedParams::from_params(params, &action.config().index_by),
        LoadSource::Function(_) if options.index_by.is_empty() => {
            let every: Vec<String> = params.keys().cloned().collect();
            IndexedParams::from_params(params, &every)
        }
        LoadSource::Function(_) => IndexedParams::from_params(params, &options.index_by),
    }
}

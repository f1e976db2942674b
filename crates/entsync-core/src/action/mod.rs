// ── Actions ──
//
// A typed unit of work: an opaque async callback plus declarative cache
// configuration. After a successful call the action applies exactly one
// cache mutation chosen by its kind.

mod config;
pub mod post_process;
mod set;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::error::CoreError;
use crate::params::Params;
use crate::store::CacheStore;
use crate::updater::UpdaterFn;

pub use config::{ActionConfig, ActionConfigPatch, DEFAULT_UNIQUE_IDENTIFIER};
pub use post_process::PostProcessContext;
pub use set::ActionsSet;

/// The async operation wrapped by an action.
pub type ActionCallback =
    Arc<dyn Fn(Params) -> BoxFuture<'static, Result<Value, CoreError>> + Send + Sync>;

/// Overrides the default params validation.
pub type ParamsValidator = Arc<dyn Fn(&ActionConfig, &Params) -> bool + Send + Sync>;

/// Overrides the kind-specific post-process step.
pub type PostProcessor = Arc<
    dyn Fn(&CacheStore, &PostProcessContext<'_>, &Value) -> Result<(), CoreError> + Send + Sync,
>;

/// What an action does to its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    List,
    Create,
    Update,
    Delete,
    Custom,
}

impl ActionKind {
    /// Returned without calling the callback when params validation fails.
    pub fn default_result(self) -> Value {
        match self {
            Self::List => Value::Array(Vec::new()),
            Self::Create | Self::Update | Self::Delete | Self::Custom => Value::Null,
        }
    }
}

/// A named operation against one entity collection.
pub struct Action {
    name: String,
    kind: ActionKind,
    callback: ActionCallback,
    config: ArcSwap<ActionConfig>,
    validator: Option<ParamsValidator>,
    post_processor: Option<PostProcessor>,
}

impl Action {
    fn with_kind<F, Fut>(kind: ActionKind, name: String, callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self {
            name,
            kind,
            callback: Arc::new(move |params| callback(params).boxed()),
            config: ArcSwap::from_pointee(ActionConfig::default()),
            validator: None,
            post_processor: None,
        }
    }

    pub fn list<F, Fut>(callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::with_kind(ActionKind::List, ActionKind::List.to_string(), callback)
    }

    pub fn create<F, Fut>(callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::with_kind(ActionKind::Create, ActionKind::Create.to_string(), callback)
    }

    pub fn update<F, Fut>(callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::with_kind(ActionKind::Update, ActionKind::Update.to_string(), callback)
    }

    pub fn delete<F, Fut>(callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::with_kind(ActionKind::Delete, ActionKind::Delete.to_string(), callback)
    }

    pub fn custom<F, Fut>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        Self::with_kind(ActionKind::Custom, name.into(), callback)
    }

    pub fn with_config(self, config: ActionConfig) -> Self {
        self.config.store(Arc::new(config));
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ActionConfig, &Params) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_post_process<F>(mut self, post_process: F) -> Self
    where
        F: Fn(&CacheStore, &PostProcessContext<'_>, &Value) -> Result<(), CoreError>
            + Send
            + Sync
            + 'static,
    {
        self.post_processor = Some(Arc::new(post_process));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// The currently published configuration.
    pub fn config(&self) -> Arc<ActionConfig> {
        self.config.load_full()
    }

    /// Shallow-merge `patch` into the configuration and publish the result.
    pub fn update_config(&self, patch: &ActionConfigPatch) {
        self.config.rcu(|current| current.merged(patch));
    }

    // ── Invocation ───────────────────────────────────────────────────

    /// Default: list actions need every `index_by` field present and
    /// non-null (the `ALL` sentinel counts as present); other kinds accept
    /// anything.
    pub fn validate_params(&self, config: &ActionConfig, params: &Params) -> bool {
        if let Some(validator) = &self.validator {
            return validator(config, params);
        }
        match self.kind {
            ActionKind::List => config
                .index_by
                .iter()
                .all(|key| params.get(key).is_some_and(|v| !v.is_null())),
            ActionKind::Create | ActionKind::Update | ActionKind::Delete | ActionKind::Custom => true,
        }
    }

    pub async fn call(&self, store: &CacheStore, params: Params) -> Result<Value, CoreError> {
        self.call_with(store, params, false).await
    }

    /// Run the callback and apply its result to `store`.
    ///
    /// Errors from the callback propagate untouched and leave the cache
    /// as it was.
    pub async fn call_with(
        &self,
        store: &CacheStore,
        params: Params,
        refetch: bool,
    ) -> Result<Value, CoreError> {
        let config = self.config();
        let cache_key = config.require_cache_key(&self.name)?.to_owned();

        if !self.validate_params(&config, &params) {
            debug!(action = %self.name, cache_key = %cache_key, "params incomplete, call skipped");
            return Ok(self.kind.default_result());
        }

        debug!(action = %self.name, cache_key = %cache_key, refetch, "calling action");
        let result = (self.callback)(params.clone()).await?;

        let ctx = PostProcessContext {
            action: &self.name,
            cache_key: &cache_key,
            config: &config,
            params: &params,
            refetch,
        };
        self.post_process(store, &ctx, &result)?;
        Ok(result)
    }

    fn post_process(
        &self,
        store: &CacheStore,
        ctx: &PostProcessContext<'_>,
        result: &Value,
    ) -> Result<(), CoreError> {
        if let Some(post_processor) = &self.post_processor {
            return post_processor(store, ctx, result);
        }
        match self.kind {
            ActionKind::List => post_process::list(store, ctx, result),
            ActionKind::Create => post_process::create(store, ctx, result),
            ActionKind::Update => post_process::update(store, ctx, result),
            ActionKind::Delete => post_process::delete(store, ctx, result),
            ActionKind::Custom => post_process::replace_snapshot(store, ctx, result),
        }
    }

    /// Adapt this action to the `(success, payload)` updater contract.
    ///
    /// Operation failures become `Ok((false, message))`; configuration
    /// errors stay errors.
    pub fn into_updater(self: Arc<Self>, store: Arc<CacheStore>) -> UpdaterFn {
        Arc::new(move |params| {
            let action = Arc::clone(&self);
            let store = Arc::clone(&store);
            async move {
                match action.call(&store, params).await {
                    Ok(result) => Ok((true, result)),
                    Err(e) if e.is_configuration() => Err(e),
                    Err(e) => Ok((false, Value::String(e.to_string()))),
                }
            }
            .boxed()
        })
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}

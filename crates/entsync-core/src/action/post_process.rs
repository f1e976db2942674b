// ── Per-kind post-process strategies ──
//
// Each strategy turns an action result into exactly one cache mutation.

use serde_json::Value;
use tracing::debug;

use super::config::ActionConfig;
use crate::error::CoreError;
use crate::params::{IndexedParams, Params, identity_of};
use crate::store::{CacheMutation, CacheStore};

/// Everything a post-processor knows about the call that produced a result.
#[derive(Debug)]
pub struct PostProcessContext<'a> {
    pub action: &'a str,
    pub cache_key: &'a str,
    pub config: &'a ActionConfig,
    pub params: &'a Params,
    pub refetch: bool,
}

impl PostProcessContext<'_> {
    pub fn indexed(&self) -> IndexedParams {
        IndexedParams::from_params(self.params, &self.config.index_by)
    }
}

/// Normalize a result into a list of entities: arrays as-is, `null` as
/// empty, anything else as a singleton.
pub fn normalize(result: &Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// List: merge into the slice, or replace it when caching is off or a
/// refetch was requested.
pub fn list(store: &CacheStore, ctx: &PostProcessContext<'_>, result: &Value) -> Result<(), CoreError> {
    let indexed = ctx.indexed();
    let items = normalize(result);
    let mutation = if !ctx.config.cache || ctx.refetch {
        CacheMutation::ReplaceAll {
            cache_key: ctx.cache_key.to_owned(),
            items,
            indexed,
        }
    } else {
        CacheMutation::UpsertAll {
            cache_key: ctx.cache_key.to_owned(),
            items,
            indexed,
            unique_identifier: ctx.config.unique_identifier.clone(),
        }
    };
    store.dispatch(mutation);
    Ok(())
}

/// Create: append the new entity to the call's slice.
pub fn create(store: &CacheStore, ctx: &PostProcessContext<'_>, result: &Value) -> Result<(), CoreError> {
    if !result.is_object() {
        debug!(action = ctx.action, cache_key = ctx.cache_key, "create returned no entity");
        return Ok(());
    }
    store.dispatch(CacheMutation::Add {
        cache_key: ctx.cache_key.to_owned(),
        item: result.clone(),
        indexed: ctx.indexed(),
    });
    Ok(())
}

/// Update: replace the entity with the result's identity.
pub fn update(store: &CacheStore, ctx: &PostProcessContext<'_>, result: &Value) -> Result<(), CoreError> {
    if !result.is_object() {
        debug!(action = ctx.action, cache_key = ctx.cache_key, "update returned no entity");
        return Ok(());
    }
    store.dispatch(CacheMutation::Update {
        cache_key: ctx.cache_key.to_owned(),
        item: result.clone(),
        indexed: ctx.indexed(),
        unique_identifier: ctx.config.unique_identifier.clone(),
    });
    Ok(())
}

/// Delete: remove the entity identified by the call params, falling back to
/// the identifier fields of the result.
pub fn delete(store: &CacheStore, ctx: &PostProcessContext<'_>, result: &Value) -> Result<(), CoreError> {
    let from_params = Value::Object(ctx.params.clone());
    let identity = if identity_of(&from_params, &ctx.config.unique_identifier).is_some() {
        from_params
    } else {
        result.clone()
    };
    store.dispatch(CacheMutation::Remove {
        cache_key: ctx.cache_key.to_owned(),
        identity,
        indexed: ctx.indexed(),
        unique_identifier: ctx.config.unique_identifier.clone(),
    });
    Ok(())
}

/// Custom default: a non-null result is a fresh snapshot of the slice.
pub fn replace_snapshot(
    store: &CacheStore,
    ctx: &PostProcessContext<'_>,
    result: &Value,
) -> Result<(), CoreError> {
    if result.is_null() {
        return Ok(());
    }
    store.dispatch(CacheMutation::ReplaceAll {
        cache_key: ctx.cache_key.to_owned(),
        items: normalize(result),
        indexed: ctx.indexed(),
    });
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx<'a>(config: &'a ActionConfig, params: &'a Params, refetch: bool) -> PostProcessContext<'a> {
        PostProcessContext {
            action: "test",
            cache_key: "pods",
            config,
            params,
            refetch,
        }
    }

    #[test]
    fn normalize_shapes() {
        assert_eq!(normalize(&json!(null)), Vec::<Value>::new());
        assert_eq!(normalize(&json!({"id": 1})), vec![json!({"id": 1})]);
        assert_eq!(normalize(&json!([1, 2])), vec![json!(1), json!(2)]);
    }

    #[test]
    fn list_annotates_with_indexed_params() {
        let store = CacheStore::new();
        let config = ActionConfig::new("pods").index_by(["clusterId"]);
        let params = json!({"clusterId": "x", "limit": 5}).as_object().unwrap().clone();

        list(&store, &ctx(&config, &params, false), &json!([{"id": "1"}])).unwrap();

        assert_eq!(*store.data("pods"), vec![json!({"id": "1", "clusterId": "x"})]);
    }

    #[test]
    fn refetch_replaces_slice() {
        let store = CacheStore::new();
        let config = ActionConfig::new("pods");
        let params = Params::new();
        list(&store, &ctx(&config, &params, false), &json!([{"id": "A"}, {"id": "B"}])).unwrap();
        list(&store, &ctx(&config, &params, true), &json!([{"id": "C"}])).unwrap();
        assert_eq!(*store.data("pods"), vec![json!({"id": "C"})]);
    }

    #[test]
    fn delete_falls_back_to_result_identity() {
        let store = CacheStore::new();
        let config = ActionConfig::new("pods");
        let params = Params::new();
        list(&store, &ctx(&config, &params, false), &json!([{"id": "A"}, {"id": "B"}])).unwrap();

        delete(&store, &ctx(&config, &params, false), &json!({"id": "A"})).unwrap();
        assert_eq!(*store.data("pods"), vec![json!({"id": "B"})]);
    }

    #[test]
    fn custom_default_ignores_null() {
        let store = CacheStore::new();
        let config = ActionConfig::new("pods");
        let params = Params::new();
        replace_snapshot(&store, &ctx(&config, &params, false), &json!(null)).unwrap();
        assert_eq!(store.version("pods"), 0);

        replace_snapshot(&store, &ctx(&config, &params, false), &json!({"id": "only"})).unwrap();
        assert_eq!(*store.data("pods"), vec![json!({"id": "only"})]);
    }
}

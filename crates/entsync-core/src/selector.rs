// ── Memoized selectors ──
//
// Reads from the cache always go through a `SelectorCache`: the first read
// of a (cache key, indexed params, sort, transform) combination filters and
// sorts the stored array; repeated reads at the same store version return
// the memoized `Arc`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::error::CoreError;
use crate::params::{IndexedParams, SortSpec, filter_by_params, sort_entities};
use crate::store::CacheStore;

/// Default number of memoized selections kept per engine.
pub const DEFAULT_SELECTOR_CAPACITY: usize = 256;

type TransformFn = Arc<dyn Fn(Vec<Value>) -> Result<Vec<Value>, CoreError> + Send + Sync>;

/// A named derivation applied after filtering and sorting.
///
/// The name is part of the memo key, so two transforms must not share a
/// name unless they compute the same thing.
#[derive(Clone)]
pub struct SelectorTransform {
    name: String,
    f: TransformFn,
}

impl SelectorTransform {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>, CoreError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SelectorTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorTransform")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What to read from the cache.
#[derive(Debug, Clone)]
pub struct SelectorQuery {
    pub cache_key: String,
    pub indexed: IndexedParams,
    pub sort: Option<SortSpec>,
    pub transform: Option<SelectorTransform>,
}

impl SelectorQuery {
    pub fn new(cache_key: impl Into<String>, indexed: IndexedParams) -> Self {
        Self {
            cache_key: cache_key.into(),
            indexed,
            sort: None,
            transform: None,
        }
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn transformed(mut self, transform: SelectorTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    fn memo_key(&self) -> MemoKey {
        MemoKey {
            cache_key: self.cache_key.clone(),
            indexed: self.indexed.token(),
            sort: self.sort.as_ref().map(SortSpec::token),
            transform: self.transform.as_ref().map(|t| t.name.clone()),
        }
    }

    /// Filter, sort and transform `items`.
    pub fn evaluate(&self, items: &[Value]) -> Result<Vec<Value>, CoreError> {
        let mut selected = filter_by_params(&self.cache_key, items, &self.indexed)?;
        if let Some(sort) = &self.sort {
            sort_entities(&mut selected, sort);
        }
        match &self.transform {
            Some(t) => (t.f)(selected).map_err(|e| CoreError::Selector {
                cache_key: self.cache_key.clone(),
                message: e.to_string(),
            }),
            None => Ok(selected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    cache_key: String,
    indexed: String,
    sort: Option<String>,
    transform: Option<String>,
}

#[derive(Debug)]
struct Memo {
    version: u64,
    value: Arc<Vec<Value>>,
}

/// Bounded memo of selector results.
///
/// Entries are validated against the cache key's version on every read and
/// evicted oldest-first once `capacity` is reached.
pub struct SelectorCache {
    capacity: usize,
    memo: Mutex<IndexMap<MemoKey, Memo>>,
}

impl SelectorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            memo: Mutex::new(IndexMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `query` from `store`, reusing the memoized result when the
    /// cache key has not changed since it was computed.
    pub fn select(&self, store: &CacheStore, query: &SelectorQuery) -> Result<Arc<Vec<Value>>, CoreError> {
        let key = query.memo_key();
        let (version, items) = store.versioned_data(&query.cache_key);

        {
            let memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = memo.get(&key).filter(|m| m.version == version) {
                return Ok(Arc::clone(&hit.value));
            }
        }

        trace!(cache_key = %query.cache_key, indexed = %query.indexed, version, "selector recompute");
        let value = Arc::new(query.evaluate(&items)?);

        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        memo.shift_remove(&key);
        while memo.len() >= self.capacity {
            memo.shift_remove_index(0);
        }
        memo.insert(
            key,
            Memo {
                version,
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    /// Drop every memoized selection for `cache_key`.
    pub fn invalidate(&self, cache_key: &str) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|k, _| k.cache_key != cache_key);
    }

    pub fn clear(&self) {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new(DEFAULT_SELECTOR_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::CacheMutation;
    use serde_json::json;

    fn seed(store: &CacheStore) {
        store.dispatch(CacheMutation::UpsertAll {
            cache_key: "pods".into(),
            items: vec![
                json!({"id": "b", "clusterId": "x"}),
                json!({"id": "a", "clusterId": "x"}),
                json!({"id": "c", "clusterId": "y"}),
            ],
            indexed: IndexedParams::default(),
            unique_identifier: vec!["id".into()],
        });
    }

    #[test]
    fn repeated_reads_share_the_memoized_arc() {
        let store = CacheStore::new();
        seed(&store);
        let selectors = SelectorCache::default();
        let query = SelectorQuery::new("pods", IndexedParams::from([("clusterId", json!("x"))]))
            .sorted(SortSpec::asc("id"));

        let first = selectors.select(&store, &query).unwrap();
        let second = selectors.select(&store, &query).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let ids: Vec<_> = first.iter().map(|p| p["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn store_mutation_invalidates_by_version() {
        let store = CacheStore::new();
        seed(&store);
        let selectors = SelectorCache::default();
        let query = SelectorQuery::new("pods", IndexedParams::default());

        let before = selectors.select(&store, &query).unwrap();
        store.clear("pods");
        let after = selectors.select(&store, &query).unwrap();
        assert_eq!(before.len(), 3);
        assert!(after.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let store = CacheStore::new();
        seed(&store);
        let selectors = SelectorCache::new(2);
        for cluster in ["x", "y", "z"] {
            let query = SelectorQuery::new("pods", IndexedParams::from([("clusterId", json!(cluster))]));
            selectors.select(&store, &query).unwrap();
        }
        assert_eq!(selectors.len(), 2);

        selectors.invalidate("pods");
        assert!(selectors.is_empty());
    }

    #[test]
    fn transform_failures_become_selector_errors() {
        let store = CacheStore::new();
        seed(&store);
        let selectors = SelectorCache::default();
        let query = SelectorQuery::new("pods", IndexedParams::default()).transformed(
            SelectorTransform::new("explode", |_| Err(CoreError::Internal("shape".into()))),
        );
        let err = selectors.select(&store, &query).unwrap_err();
        assert!(matches!(err, CoreError::Selector { ref cache_key, .. } if cache_key == "pods"));
    }
}

// ── Normalized entity cache ──
//
// Per-key entity arrays, fetched-params sets and loading flags. Writes go
// through `dispatch` only; every applied mutation bumps the per-key version
// and a store-wide revision broadcast through a `watch` channel.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::reducers::{CacheEntry, CacheMutation, reduce};
use crate::params::IndexedParams;
use crate::stream::ChangeStream;

/// Process-wide (per [`Engine`](crate::Engine)) normalized entity cache.
///
/// Concurrent access is safe: each key lives in its own `DashMap` shard
/// slot and a mutation holds that slot for the duration of one reducer
/// call, which never awaits.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    revision: watch::Sender<u64>,
}

impl CacheStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0u64);
        Self {
            entries: DashMap::new(),
            revision,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Apply one mutation. Returns `true` if the store changed.
    pub fn dispatch(&self, mutation: CacheMutation) -> bool {
        let name = mutation.name();
        let changed = match mutation.cache_key() {
            Some(key) => {
                let key = key.to_owned();
                let mut entry = self.entries.entry(key.clone()).or_default();
                let changed = reduce(&mut entry, mutation);
                trace!(cache_key = %key, mutation = name, changed, version = entry.version, "dispatched");
                changed
            }
            None => {
                let mut changed = false;
                for mut entry in self.entries.iter_mut() {
                    changed |= reduce(entry.value_mut(), CacheMutation::ClearAll);
                }
                debug!(keys = self.entries.len(), "cache cleared");
                changed
            }
        };

        if changed {
            self.revision.send_modify(|r| *r += 1);
        }
        changed
    }

    pub fn set_loading(&self, cache_key: &str, loading: bool) -> bool {
        self.dispatch(CacheMutation::SetLoading {
            cache_key: cache_key.to_owned(),
            loading,
        })
    }

    pub fn clear(&self, cache_key: &str) -> bool {
        self.dispatch(CacheMutation::Clear {
            cache_key: cache_key.to_owned(),
        })
    }

    pub fn clear_all(&self) -> bool {
        self.dispatch(CacheMutation::ClearAll)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current entity array for `cache_key` (cheap `Arc` clone).
    pub fn data(&self, cache_key: &str) -> Arc<Vec<Value>> {
        self.entries
            .get(cache_key)
            .map(|e| Arc::clone(&e.data))
            .unwrap_or_default()
    }

    /// Entity array together with the version it was read at.
    pub fn versioned_data(&self, cache_key: &str) -> (u64, Arc<Vec<Value>>) {
        self.entries
            .get(cache_key)
            .map(|e| (e.version, Arc::clone(&e.data)))
            .unwrap_or_default()
    }

    pub fn loading(&self, cache_key: &str) -> bool {
        self.entries.get(cache_key).is_some_and(|e| e.loading)
    }

    pub fn has_fetched(&self, cache_key: &str, indexed: &IndexedParams) -> bool {
        self.entries
            .get(cache_key)
            .is_some_and(|e| e.has_fetched(indexed))
    }

    pub fn fetched_params(&self, cache_key: &str) -> Vec<IndexedParams> {
        self.entries
            .get(cache_key)
            .map(|e| e.fetched_params.clone())
            .unwrap_or_default()
    }

    pub fn version(&self, cache_key: &str) -> u64 {
        self.entries.get(cache_key).map_or(0, |e| e.version)
    }

    /// All cache keys that have ever been touched.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Store-wide revision, bumped on every effective mutation.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Subscribe to store-wide changes.
    pub fn subscribe(&self) -> ChangeStream<u64> {
        ChangeStream::new(self.revision.subscribe())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

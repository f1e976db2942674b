// ── Cache reducers ──
//
// The fixed set of mutations a `CacheStore` accepts, and the pure function
// applying one of them to a single cache key's entry.

use std::sync::Arc;

use serde_json::Value;

use crate::params::{IndexedParams, identity_of, same_identity};

/// Everything stored for one cache key.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Entity records; a set keyed by the unique identifier, kept in
    /// insertion order for stable rendering.
    pub data: Arc<Vec<Value>>,
    /// Indexed-params combinations for which a load has completed.
    pub fetched_params: Vec<IndexedParams>,
    /// Currently-fetching flag, shared by every parameter set of the key.
    pub loading: bool,
    /// Bumped on every mutation that touches this entry.
    pub version: u64,
}

impl CacheEntry {
    pub fn has_fetched(&self, indexed: &IndexedParams) -> bool {
        self.fetched_params.contains(indexed)
    }

    fn mark_fetched(&mut self, indexed: &IndexedParams) {
        if !self.has_fetched(indexed) {
            self.fetched_params.push(indexed.clone());
        }
    }
}

/// A single cache mutation.
#[derive(Debug, Clone)]
pub enum CacheMutation {
    /// Merge `items` into the slice by unique identifier and record the slice as fetched.
    /// Items lacking an identifier merge with an equal entity, if any.
    UpsertAll {
        cache_key: String,
        items: Vec<Value>,
        indexed: IndexedParams,
        unique_identifier: Vec<String>,
    },
    /// Drop every entity in the slice, append `items`, record the slice as fetched.
    ReplaceAll {
        cache_key: String,
        items: Vec<Value>,
        indexed: IndexedParams,
    },
    /// Append one entity annotated with the slice params.
    Add {
        cache_key: String,
        item: Value,
        indexed: IndexedParams,
    },
    /// Replace the entity with the same identity inside the slice.
    Update {
        cache_key: String,
        item: Value,
        indexed: IndexedParams,
        unique_identifier: Vec<String>,
    },
    /// Remove every entity inside the slice carrying `identity`'s identifier values.
    Remove {
        cache_key: String,
        identity: Value,
        indexed: IndexedParams,
        unique_identifier: Vec<String>,
    },
    SetLoading {
        cache_key: String,
        loading: bool,
    },
    /// Forget everything stored for one key.
    Clear { cache_key: String },
    /// Forget everything.
    ClearAll,
}

impl CacheMutation {
    /// The key this mutation targets; `None` for [`ClearAll`](Self::ClearAll).
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            Self::UpsertAll { cache_key, .. }
            | Self::ReplaceAll { cache_key, .. }
            | Self::Add { cache_key, .. }
            | Self::Update { cache_key, .. }
            | Self::Remove { cache_key, .. }
            | Self::SetLoading { cache_key, .. }
            | Self::Clear { cache_key } => Some(cache_key),
            Self::ClearAll => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UpsertAll { .. } => "upsert_all",
            Self::ReplaceAll { .. } => "replace_all",
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::SetLoading { .. } => "set_loading",
            Self::Clear { .. } => "clear",
            Self::ClearAll => "clear_all",
        }
    }
}

/// Apply `mutation` to `entry`. Returns `true` if anything changed.
///
/// `Clear`/`ClearAll` are handled by the store itself since they remove
/// entries rather than modify them; here they reset the entry in place.
pub fn reduce(entry: &mut CacheEntry, mutation: CacheMutation) -> bool {
    let changed = match mutation {
        CacheMutation::UpsertAll {
            items,
            indexed,
            unique_identifier,
            ..
        } => {
            let data = Arc::make_mut(&mut entry.data);
            for item in items {
                upsert(data, item, &indexed, &unique_identifier);
            }
            entry.mark_fetched(&indexed);
            true
        }
        CacheMutation::ReplaceAll { items, indexed, .. } => {
            let data = Arc::make_mut(&mut entry.data);
            // Malformed entries never survive a replace.
            data.retain(|existing| existing.is_object() && !indexed.matches(existing));
            data.extend(items.into_iter().map(|mut item| {
                indexed.annotate(&mut item);
                item
            }));
            entry.mark_fetched(&indexed);
            true
        }
        CacheMutation::Add {
            mut item, indexed, ..
        } => {
            indexed.annotate(&mut item);
            Arc::make_mut(&mut entry.data).push(item);
            true
        }
        CacheMutation::Update {
            mut item,
            indexed,
            unique_identifier,
            ..
        } => {
            indexed.annotate(&mut item);
            let position = entry.data.iter().position(|existing| {
                indexed.matches(existing) && same_identity(existing, &item, &unique_identifier)
            });
            match position {
                Some(idx) => {
                    if let Some(slot) = Arc::make_mut(&mut entry.data).get_mut(idx) {
                        *slot = item;
                    }
                    true
                }
                None => false,
            }
        }
        CacheMutation::Remove {
            identity,
            indexed,
            unique_identifier,
            ..
        } => {
            if identity_of(&identity, &unique_identifier).is_none() {
                return false;
            }
            let before = entry.data.len();
            let keep: Vec<Value> = entry
                .data
                .iter()
                .filter(|existing| {
                    !(indexed.matches(existing)
                        && same_identity(existing, &identity, &unique_identifier))
                })
                .cloned()
                .collect();
            if keep.len() == before {
                false
            } else {
                entry.data = Arc::new(keep);
                true
            }
        }
        CacheMutation::SetLoading { loading, .. } => {
            let changed = entry.loading != loading;
            entry.loading = loading;
            changed
        }
        CacheMutation::Clear { .. } | CacheMutation::ClearAll => {
            *entry = CacheEntry {
                version: entry.version,
                ..CacheEntry::default()
            };
            true
        }
    };

    if changed {
        entry.version += 1;
    }
    changed
}

/// Insert-or-replace inside the slice, matching on identity. Items with no
/// identity match an equal entity instead.
fn upsert(data: &mut Vec<Value>, mut item: Value, indexed: &IndexedParams, unique_identifier: &[String]) {
    indexed.annotate(&mut item);
    let identified = identity_of(&item, unique_identifier).is_some();
    let existing = data.iter().position(|existing| {
        indexed.matches(existing)
            && if identified {
                same_identity(existing, &item, unique_identifier)
            } else {
                *existing == item
            }
    });
    match existing {
        Some(slot) => data[slot] = item,
        None => data.push(item),
    }
}

// ── Normalized cache store ──
//
// Entity arrays, fetched-params sets and loading flags per cache key,
// mutated only through the reducers in `reducers`.

mod cache_store;
mod reducers;

pub use cache_store::CacheStore;
pub use reducers::{CacheEntry, CacheMutation, reduce};

// ── Params filter / sorter ──
//
// Pure functions that turn caller parameters into cache partitions and
// select/order the entities belonging to one partition.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Caller-supplied query parameters.
pub type Params = Map<String, Value>;

/// Reserved parameter value meaning "no filter".
pub const ALL: &str = "__all__";

/// `true` for values that must never partition the cache: `null` and [`ALL`].
pub fn is_sentinel(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == ALL,
        _ => false,
    }
}

/// Drop every key whose value is a sentinel.
pub fn strip_sentinels(params: &Params) -> Params {
    params
        .iter()
        .filter(|(_, v)| !is_sentinel(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Keep only the keys named in `index_by`.
pub fn pick_indexed(params: &Params, index_by: &[String]) -> Params {
    index_by
        .iter()
        .filter_map(|key| params.get(key).map(|v| (key.clone(), v.clone())))
        .collect()
}

// ── IndexedParams ────────────────────────────────────────────────────

/// The partitioning subset of a parameter set.
///
/// Backed by a `BTreeMap` so two structurally equal parameter objects
/// compare equal and produce the same [`token`](Self::token) regardless of
/// the order their keys were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexedParams(BTreeMap<String, Value>);

impl IndexedParams {
    /// Pick the `index_by` keys out of `params`, then strip sentinels.
    pub fn from_params(params: &Params, index_by: &[String]) -> Self {
        let picked = pick_indexed(params, index_by);
        Self(strip_sentinels(&picked).into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Canonical string form, used as a memo key.
    pub fn token(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Whether `entity` belongs to the slice described by these params.
    ///
    /// Non-object entities never match.
    pub fn matches(&self, entity: &Value) -> bool {
        let Some(obj) = entity.as_object() else {
            return false;
        };
        self.0.iter().all(|(k, v)| obj.get(k) == Some(v))
    }

    /// Write the indexed values onto `entity` so later slice queries find it.
    pub fn annotate(&self, entity: &mut Value) {
        if let Some(obj) = entity.as_object_mut() {
            for (k, v) in &self.0 {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
}

impl fmt::Display for IndexedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for IndexedParams {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .filter(|(_, v)| !is_sentinel(v))
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }
}

// ── Identity ─────────────────────────────────────────────────────────

/// Values of the identifying fields of `entity`, or `None` if any is missing.
pub fn identity_of<'a>(entity: &'a Value, unique_identifier: &[String]) -> Option<Vec<&'a Value>> {
    let obj = entity.as_object()?;
    unique_identifier
        .iter()
        .map(|field| obj.get(field).filter(|v| !v.is_null()))
        .collect()
}

/// Whether two entities carry the same identity.
pub fn same_identity(a: &Value, b: &Value, unique_identifier: &[String]) -> bool {
    match (identity_of(a, unique_identifier), identity_of(b, unique_identifier)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

// ── Filter ───────────────────────────────────────────────────────────

/// Select the entities belonging to the `indexed` slice.
///
/// Fails on the first stored entity that is not a JSON object, which can
/// only happen when something wrote a malformed value into the cache.
pub fn filter_by_params(
    cache_key: &str,
    items: &[Value],
    indexed: &IndexedParams,
) -> Result<Vec<Value>, CoreError> {
    let mut selected = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_object() {
            return Err(CoreError::InvalidEntity {
                cache_key: cache_key.to_owned(),
                found: describe(item).to_owned(),
            });
        }
        if indexed.matches(item) {
            selected.push(item.clone());
        }
    }
    Ok(selected)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Sorter ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Which field to order a selection by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub order_by: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(order_by: impl Into<String>) -> Self {
        Self {
            order_by: order_by.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(order_by: impl Into<String>) -> Self {
        Self {
            order_by: order_by.into(),
            direction: SortDirection::Desc,
        }
    }

    pub(crate) fn token(&self) -> String {
        match self.direction {
            SortDirection::Asc => format!("{}:asc", self.order_by),
            SortDirection::Desc => format!("{}:desc", self.order_by),
        }
    }
}

/// Stable sort of `items` by `spec.order_by`. Missing fields sort as `null`.
pub fn sort_entities(items: &mut [Value], spec: &SortSpec) {
    items.sort_by(|a, b| {
        let ord = compare_values(
            a.get(&spec.order_by).unwrap_or(&Value::Null),
            b.get(&spec.order_by).unwrap_or(&Value::Null),
        );
        match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        _ => rank(a).cmp(&rank(b)),
    }
}

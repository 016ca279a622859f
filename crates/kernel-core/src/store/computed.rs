//! Lazy, memoised computed values (§4.5 "Computed values").

use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read-only view of a store's current key/value map, used while evaluating
/// a selector to discover which keys it depends on.
pub struct TrackingReader<'a> {
    data: &'a HashMap<String, Value>,
    touched: RefCell<HashSet<String>>,
}

impl<'a> TrackingReader<'a> {
    pub fn new(data: &'a HashMap<String, Value>) -> Self {
        TrackingReader {
            data,
            touched: RefCell::new(HashSet::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.touched.borrow_mut().insert(key.to_string());
        self.data.get(key).cloned()
    }

    pub fn into_touched(self) -> HashSet<String> {
        self.touched.into_inner()
    }
}

pub type Selector = Arc<dyn Fn(&TrackingReader<'_>) -> Value + Send + Sync>;

/// A registered `computed(selector)` entry: the selector, its last output,
/// and the key versions observed while producing it.
pub struct ComputedEntry {
    pub id: u64,
    pub selector: Selector,
    pub cached_value: Option<Value>,
    pub read_versions: HashMap<String, u64>,
}

impl ComputedEntry {
    pub fn new(id: u64, selector: Selector) -> Self {
        ComputedEntry {
            id,
            selector,
            cached_value: None,
            read_versions: HashMap::new(),
        }
    }

    /// Re-evaluates if uncached or any key read during the previous
    /// evaluation now has a different version; returns `(value, changed)`
    /// where `changed` reports whether the memoised output itself differs.
    pub fn evaluate(
        &mut self,
        data: &HashMap<String, Value>,
        key_versions: &HashMap<String, u64>,
    ) -> (Value, bool) {
        let stale = self.cached_value.is_none()
            || self
                .read_versions
                .iter()
                .any(|(k, v)| key_versions.get(k).copied().unwrap_or(0) != *v);
        if !stale {
            return (self.cached_value.clone().unwrap(), false);
        }
        let reader = TrackingReader::new(data);
        let value = (self.selector)(&reader);
        let touched = reader.into_touched();
        self.read_versions = touched
            .into_iter()
            .map(|k| {
                let v = key_versions.get(&k).copied().unwrap_or(0);
                (k, v)
            })
            .collect();
        let changed = self.cached_value.as_ref() != Some(&value);
        self.cached_value = Some(value.clone());
        (value, changed)
    }
}

//! Erased plugin APIs.
//!
//! A plugin's `setup` produces an API: a named table of callable operations.
//! Rust has no structural typing, so each operation is stored as a boxed
//! closure over JSON-erased arguments and return value — the runtime moves
//! names and callables, the way the source system does; builder-level types
//! are only a compile-time convenience on top of this.

use crate::error::KernelError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ApiArgs = Vec<Value>;
pub type ApiFuture = Pin<Box<dyn Future<Output = Result<Value, KernelError>> + Send>>;

/// A single callable operation exposed by a plugin's API.
pub type ApiMethod = Arc<dyn Fn(ApiArgs) -> ApiFuture + Send + Sync>;

/// Wraps a synchronous closure as an [`ApiMethod`].
pub fn sync_method<F>(f: F) -> ApiMethod
where
    F: Fn(ApiArgs) -> Result<Value, KernelError> + Send + Sync + 'static,
{
    Arc::new(move |args| {
        let result = f(args);
        Box::pin(async move { result })
    })
}

/// Wraps an async closure (returning a boxed future) as an [`ApiMethod`].
pub fn async_method<F, Fut>(f: F) -> ApiMethod
where
    F: Fn(ApiArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, KernelError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// A plugin's published API: an insertion-ordered table of named methods
/// plus free-form metadata values (e.g. non-callable constants).
#[derive(Clone, Default)]
pub struct PluginApi {
    methods: HashMap<String, ApiMethod>,
    values: HashMap<String, Value>,
    order: Vec<String>,
}

impl fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginApi")
            .field("methods", &self.order)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, name: impl Into<String>, method: ApiMethod) -> Self {
        self.insert_method(name, method);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert_value(name, value);
        self
    }

    pub fn insert_method(&mut self, name: impl Into<String>, method: ApiMethod) {
        let name = name.into();
        if !self.methods.contains_key(&name) && !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.methods.insert(name, method);
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !self.methods.contains_key(&name) && !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value);
    }

    pub fn method(&self, name: &str) -> Option<ApiMethod> {
        self.methods.get(name).cloned()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Names of every function-valued key, in registration order — the set
    /// the proxy compiler's method selection (§4.4) walks.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().filter(move |n| self.methods.contains_key(*n)).map(String::as_str)
    }

    /// Shallow-merges `other` into `self`, overriding existing keys — the
    /// extension merge algorithm of §4.3.
    pub fn merge(&mut self, other: PluginApi) {
        for name in other.order {
            if let Some(method) = other.methods.get(&name) {
                self.insert_method(name, method.clone());
            } else if let Some(value) = other.values.get(&name) {
                self.insert_value(name, value.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

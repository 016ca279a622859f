//! Context objects threaded through lifecycle hooks and `setup`.

use crate::kernel::KernelConfig;
use crate::plugin::api::PluginApi;
use crate::store::Store;
use serde_json::Value;
use std::collections::HashMap;

/// A resolved dependency's API, decorated with `$meta` and `$store` as
/// required by §4.4/§4.6 — every dependency API a plugin sees carries its
/// source plugin's metadata and a handle to its live store.
#[derive(Clone)]
pub struct DependencyApi {
    pub api: PluginApi,
    pub meta: Value,
    pub store: Store,
}

/// `kernelContext` of §4.6: passed to `onInit` and `setup`, carrying the
/// plugin's own id, the kernel configuration, resolved dependency APIs, and
/// the plugin's own (already constructed) store.
#[derive(Clone)]
pub struct PluginContext {
    pub id: String,
    pub config: KernelConfig,
    pub store: Store,
    deps: HashMap<String, DependencyApi>,
}

impl PluginContext {
    pub fn new(id: impl Into<String>, config: KernelConfig, store: Store) -> Self {
        PluginContext {
            id: id.into(),
            config,
            store,
            deps: HashMap::new(),
        }
    }

    pub fn with_deps(mut self, deps: HashMap<String, DependencyApi>) -> Self {
        self.deps = deps;
        self
    }

    /// `ctx.get(name)` — the dependency's API, or `None` if `name` names an
    /// optional dependency that failed to load or was never declared.
    pub fn get(&self, name: &str) -> Option<&DependencyApi> {
        self.deps.get(name)
    }

    pub fn deps(&self) -> &HashMap<String, DependencyApi> {
        &self.deps
    }
}

//! Immutable plugin descriptor (§3) and the hook/setup callable shapes.

use crate::error::KernelError;
use crate::extension::ExtensionSpec;
use crate::plugin::api::PluginApi;
use crate::plugin::context::PluginContext;
use crate::plugin::dependency::Dependency;
use crate::proxy::ProxySpec;
use crate::store::StoreOptions;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), KernelError>> + Send>>;
pub type ApiResultFuture = Pin<Box<dyn Future<Output = Result<PluginApi, KernelError>> + Send>>;

pub type SetupFn = Arc<dyn Fn(PluginContext) -> ApiResultFuture + Send + Sync>;
pub type InitHook = Arc<dyn Fn(PluginContext) -> HookFuture + Send + Sync>;
pub type ReadyHook = Arc<dyn Fn(PluginContext, PluginApi) -> HookFuture + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(PluginContext, Arc<KernelError>) -> HookFuture + Send + Sync>;
pub type ShutdownHook = Arc<dyn Fn(PluginContext) -> HookFuture + Send + Sync>;

#[derive(Default, Clone)]
pub struct Hooks {
    pub on_init: Option<InitHook>,
    pub on_ready: Option<ReadyHook>,
    pub on_error: Option<ErrorHook>,
    pub on_shutdown: Option<ShutdownHook>,
}

/// The immutable result of `PluginBuilder::build()` — registered once,
/// never mutated afterward. See §3 "Plugin descriptor".
#[derive(Clone)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub version: semver::Version,
    pub dependencies: Vec<Dependency>,
    pub setup: SetupFn,
    pub hooks: Hooks,
    pub extensions: Vec<ExtensionSpec>,
    pub proxies: Vec<ProxySpec>,
    pub store_initial: Vec<(String, Value)>,
    pub store_options: StoreOptions,
    pub metadata: Value,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

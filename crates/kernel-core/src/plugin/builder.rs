//! Fluent plugin descriptor builder (§6 builder surface).

use crate::error::{KernelError, RegistryError};
use crate::extension::ExtensionSpec;
use crate::plugin::api::PluginApi;
use crate::plugin::context::PluginContext;
use crate::plugin::dependency::Dependency;
use crate::plugin::descriptor::{
    ApiResultFuture, ErrorHook, Hooks, InitHook, PluginDescriptor, ReadyHook, ShutdownHook,
};
use crate::proxy::{ProxyConfig, ProxySpec, ProxyTarget};
use crate::store::StoreOptions;
use crate::version::VersionRange;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Options accepted by `.depends(target, range, opts)`.
#[derive(Default, Clone, Copy)]
pub struct DependOptions {
    pub optional: bool,
}

pub struct PluginBuilder {
    name: String,
    version: semver::Version,
    dependencies: Vec<Dependency>,
    setup: Option<crate::plugin::descriptor::SetupFn>,
    hooks: Hooks,
    extensions: Vec<ExtensionSpec>,
    proxies: Vec<ProxySpec>,
    store_initial: Vec<(String, Value)>,
    store_options: StoreOptions,
    metadata: Value,
}

/// Starts a new plugin descriptor. `version` must be a valid semver string.
pub fn plugin(name: impl Into<String>, version: &str) -> Result<PluginBuilder, KernelError> {
    let name = name.into();
    let version = crate::version::parse_version(version).map_err(|e| {
        KernelError::from(RegistryError::InvalidDescriptor {
            plugin_id: name.clone(),
            message: e.to_string(),
        })
    })?;
    Ok(PluginBuilder {
        name,
        version,
        dependencies: Vec::new(),
        setup: None,
        hooks: Hooks::default(),
        extensions: Vec::new(),
        proxies: Vec::new(),
        store_initial: Vec::new(),
        store_options: StoreOptions::default(),
        metadata: Value::Null,
    })
}

impl PluginBuilder {
    pub fn depends(mut self, target: impl Into<String>, range: &str) -> Result<Self, KernelError> {
        self.push_dependency(target, range, DependOptions::default())?;
        Ok(self)
    }

    pub fn depends_optional(
        mut self,
        target: impl Into<String>,
        range: &str,
    ) -> Result<Self, KernelError> {
        self.push_dependency(target, range, DependOptions { optional: true })?;
        Ok(self)
    }

    fn push_dependency(
        &mut self,
        target: impl Into<String>,
        range: &str,
        opts: DependOptions,
    ) -> Result<(), KernelError> {
        let target = target.into();
        let version_range = VersionRange::parse(range).map_err(|e| {
            KernelError::from(RegistryError::InvalidDescriptor {
                plugin_id: self.name.clone(),
                message: e.to_string(),
            })
        })?;
        let dep = if opts.optional {
            Dependency::optional(target, version_range)
        } else {
            Dependency::required(target, version_range)
        };
        self.dependencies.push(dep);
        Ok(())
    }

    pub fn store(mut self, initial: Vec<(&str, Value)>, options: StoreOptions) -> Self {
        self.store_initial = initial.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.store_options = options;
        self
    }

    pub fn extend<F>(mut self, target: impl Into<String>, extension_fn: F) -> Self
    where
        F: Fn(&PluginApi) -> PluginApi + Send + Sync + 'static,
    {
        self.extensions.push(ExtensionSpec {
            target_plugin_id: target.into(),
            extension_fn: Arc::new(extension_fn),
        });
        self
    }

    pub fn proxy(mut self, target: ProxyTarget, config: ProxyConfig) -> Self {
        self.proxies.push(ProxySpec { target, config });
        self
    }

    pub fn on_init<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        let hook: InitHook = Arc::new(move |ctx| Box::pin(hook(ctx)));
        self.hooks.on_init = Some(hook);
        self
    }

    pub fn on_ready<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext, PluginApi) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        let hook: ReadyHook = Arc::new(move |ctx, api| Box::pin(hook(ctx, api)));
        self.hooks.on_ready = Some(hook);
        self
    }

    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext, Arc<KernelError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        let hook: ErrorHook = Arc::new(move |ctx, err| Box::pin(hook(ctx, err)));
        self.hooks.on_error = Some(hook);
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), KernelError>> + Send + 'static,
    {
        let hook: ShutdownHook = Arc::new(move |ctx| Box::pin(hook(ctx)));
        self.hooks.on_shutdown = Some(hook);
        self
    }

    pub fn setup<F, Fut>(mut self, setup_fn: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PluginApi, KernelError>> + Send + 'static,
    {
        let f: crate::plugin::descriptor::SetupFn =
            Arc::new(move |ctx| -> ApiResultFuture { Box::pin(setup_fn(ctx)) });
        self.setup = Some(f);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Result<PluginDescriptor, KernelError> {
        let setup = self.setup.ok_or_else(|| {
            KernelError::from(RegistryError::InvalidDescriptor {
                plugin_id: self.name.clone(),
                message: "plugin descriptor has no setup function".to_string(),
            })
        })?;
        Ok(PluginDescriptor {
            id: self.name.clone(),
            name: self.name,
            version: self.version,
            dependencies: self.dependencies,
            setup,
            hooks: self.hooks,
            extensions: self.extensions,
            proxies: self.proxies,
            store_initial: self.store_initial,
            store_options: self.store_options,
            metadata: self.metadata,
        })
    }
}

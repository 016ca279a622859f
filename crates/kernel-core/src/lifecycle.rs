//! Lifecycle manager (§4.6): drives the ordered init walk and reverse-order
//! shutdown.
//!
//! Follows an ordered forward-init, reverse-shutdown stage walk, with one
//! deliberate deviation from the common abort-on-first-failure shape: a
//! plugin ecosystem's shutdown hooks are independent of each other, so a
//! failing `onShutdown` is logged and the walk continues (see DESIGN.md
//! "Deviations").

use crate::error::{KernelError, LifecycleError};
use crate::kernel::{KernelConfig, SharedRegistry};
use crate::plugin::context::{DependencyApi, PluginContext};
use crate::plugin::{PluginDescriptor, PluginState};
use crate::proxy::{self, ExpandedProxy, PluginLookup};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub struct LifecycleManager {
    registry: SharedRegistry,
    config: KernelConfig,
}

impl LifecycleManager {
    pub fn new(registry: SharedRegistry, config: KernelConfig) -> Self {
        LifecycleManager { registry, config }
    }

    /// Runs the §4.6 init algorithm over `order`:
    /// expand proxies once, then for each plugin: mark LOADING, build its
    /// dependency map, run `onInit`, `setup`, extension merge, proxy wrap,
    /// mark LOADED, run `onReady`.
    pub async fn run(&self, descriptors: &[PluginDescriptor], order: &[String]) -> Result<(), KernelError> {
        let by_id: HashMap<&str, &PluginDescriptor> = descriptors.iter().map(|d| (d.id.as_str(), d)).collect();
        let all_extensions: Vec<_> = descriptors.iter().flat_map(|d| d.extensions.clone()).collect();
        let expanded_proxies = proxy::expand_targets(descriptors);
        let lookup: Arc<dyn PluginLookup> = Arc::new(RegistryLookup(self.registry.clone()));

        for id in order {
            let descriptor = *by_id
                .get(id.as_str())
                .ok_or_else(|| KernelError::from(LifecycleError::UnknownPlugin(id.clone())))?;

            if let Err(err) = self.init_one(descriptor, &all_extensions, &expanded_proxies, lookup.clone()).await {
                self.run_error_hook(descriptor, &err).await;
                let mut registry = self.registry.lock().await;
                let _ = registry.set_state(id, PluginState::Error);
                return Err(err.into_initialization_error(id.clone()));
            }
        }
        Ok(())
    }

    async fn init_one(
        &self,
        descriptor: &PluginDescriptor,
        all_extensions: &[crate::extension::ExtensionSpec],
        expanded_proxies: &[ExpandedProxy],
        lookup: Arc<dyn PluginLookup>,
    ) -> Result<(), KernelError> {
        let id = &descriptor.id;
        {
            let mut registry = self.registry.lock().await;
            registry.set_state(id, PluginState::Loading)?;
        }

        let own_store = {
            let registry = self.registry.lock().await;
            registry.store(id).expect("store created at registration")
        };
        let deps = self.build_deps(descriptor).await;
        let ctx = PluginContext::new(id.clone(), self.config.clone(), own_store.clone()).with_deps(deps);

        if let Some(on_init) = descriptor.hooks.on_init.clone() {
            self.with_timeout(id, "onInit", on_init(ctx.clone())).await?;
        }

        let api = self
            .with_timeout(id, "setup", (descriptor.setup)(ctx.clone()))
            .await
            .map_err(|err| {
                KernelError::from(crate::error::LifecycleError::SetupFailed {
                    plugin_id: id.clone(),
                    message: err.to_string(),
                    source: None,
                })
            })?;

        let mut extended = api.clone();
        if self.config.extensions_enabled {
            crate::extension::apply_extensions(&mut extended, id, all_extensions);
        }

        let method_names: Vec<String> = extended.method_names().map(String::from).collect();
        let compiled = proxy::compile_for_plugin(id, &method_names, expanded_proxies)?;
        let mut wrapped = extended.clone();
        for (method_name, chain) in compiled {
            if chain.is_empty() {
                continue;
            }
            if let Some(original) = extended.method(&method_name) {
                let wrapped_method = proxy::wrap_method(
                    id.clone(),
                    method_name.clone(),
                    original,
                    chain,
                    own_store.clone(),
                    lookup.clone(),
                );
                wrapped.insert_method(method_name, wrapped_method);
            }
        }

        {
            let mut registry = self.registry.lock().await;
            let instance = registry.instance_mut(id).expect("instance created at registration");
            instance.original_api = Some(api);
            instance.current_api = Some(wrapped.clone());
            instance.loaded_at = Some(std::time::SystemTime::now());
            registry.set_state(id, PluginState::Loaded)?;
        }

        if let Some(on_ready) = descriptor.hooks.on_ready.clone() {
            self.with_timeout(id, "onReady", on_ready(ctx.clone(), wrapped)).await?;
        }
        {
            let mut registry = self.registry.lock().await;
            if let Some(instance) = registry.instance_mut(id) {
                instance.ready_at = Some(std::time::SystemTime::now());
            }
        }
        Ok(())
    }

    async fn build_deps(&self, descriptor: &PluginDescriptor) -> HashMap<String, DependencyApi> {
        let registry = self.registry.lock().await;
        let mut deps = HashMap::new();
        for dep in &descriptor.dependencies {
            let Some(target_descriptor) = registry.descriptor(&dep.plugin_id) else {
                continue;
            };
            let Some(instance) = registry.instance(&dep.plugin_id) else {
                continue;
            };
            let Some(api) = instance.current_api.clone() else {
                continue;
            };
            deps.insert(
                dep.plugin_id.clone(),
                DependencyApi {
                    api,
                    meta: target_descriptor.metadata.clone(),
                    store: instance.store.clone(),
                },
            );
        }
        deps
    }

    async fn with_timeout<T>(
        &self,
        plugin_id: &str,
        hook: &'static str,
        fut: impl std::future::Future<Output = Result<T, KernelError>>,
    ) -> Result<T, KernelError> {
        match timeout(self.config.initialization_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::from(LifecycleError::Timeout {
                plugin_id: plugin_id.to_string(),
                timeout_ms: self.config.initialization_timeout.as_millis() as u64,
            })
            .with_context(hook)),
        }
    }

    async fn run_error_hook(&self, descriptor: &PluginDescriptor, err: &KernelError) {
        let Some(on_error) = descriptor.hooks.on_error.clone() else {
            return;
        };
        let registry = self.registry.lock().await;
        let Some(store) = registry.store(&descriptor.id) else {
            return;
        };
        drop(registry);
        let ctx = PluginContext::new(descriptor.id.clone(), self.config.clone(), store);
        let wrapped = Arc::new(KernelError::new(crate::error::KernelErrorKind::Other(err.to_string())));
        if let Err(hook_err) = on_error(ctx, wrapped).await {
            tracing::error!(plugin_id = %descriptor.id, error = %hook_err, "onError hook itself failed");
        }
    }

    /// Runs every loaded plugin's `onShutdown` in reverse resolved-init
    /// order, logging (not propagating) failures. `init_order` is the order
    /// `run` resolved dependencies into; reversing it (rather than
    /// registration order) ensures dependents shut down before the
    /// dependencies they may still be calling.
    pub async fn shutdown(&self, descriptors: &[PluginDescriptor], init_order: &[String]) {
        let by_id: HashMap<&str, &PluginDescriptor> = descriptors.iter().map(|d| (d.id.as_str(), d)).collect();
        for id in init_order.iter().rev() {
            let Some(descriptor) = by_id.get(id.as_str()) else {
                continue;
            };
            let state = {
                let registry = self.registry.lock().await;
                registry.state(id.as_str())
            };
            if state != Some(PluginState::Loaded) {
                continue;
            }
            if let Some(on_shutdown) = descriptor.hooks.on_shutdown.clone() {
                let store = {
                    let registry = self.registry.lock().await;
                    registry.store(id.as_str())
                };
                if let Some(store) = store {
                    let ctx = PluginContext::new(id.clone(), self.config.clone(), store);
                    match timeout(self.shutdown_timeout(), on_shutdown(ctx)).await {
                        Ok(Err(err)) => {
                            tracing::error!(plugin_id = %id, error = %err, "onShutdown hook failed, continuing");
                        }
                        Err(_) => {
                            tracing::error!(plugin_id = %id, "onShutdown hook timed out, continuing");
                        }
                        Ok(Ok(())) => {}
                    }
                }
            }
            let mut registry = self.registry.lock().await;
            if let Some(instance) = registry.instance_mut(id.as_str()) {
                instance.shutdown_at = Some(std::time::SystemTime::now());
            }
            let _ = registry.set_state(id.as_str(), PluginState::Destroyed);
        }
    }

    fn shutdown_timeout(&self) -> Duration {
        self.config.initialization_timeout
    }
}

struct RegistryLookup(SharedRegistry);

#[async_trait::async_trait]
impl PluginLookup for RegistryLookup {
    async fn dependency_api(&self, id: &str) -> Option<DependencyApi> {
        let registry = self.0.lock().await;
        let descriptor = registry.descriptor(id)?;
        let instance = registry.instance(id)?;
        let api = instance.current_api.clone()?;
        Some(DependencyApi {
            api,
            meta: descriptor.metadata.clone(),
            store: instance.store.clone(),
        })
    }
}

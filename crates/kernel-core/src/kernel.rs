//! The public kernel facade (§6 "External interfaces").
//!
//! A builder/facade split: a builder collects plugins and configuration,
//! `start()` drives the ordered lifecycle walk, and the running facade
//! exposes a typed `get(name)` accessor, keyed by plugin id rather than by
//! Rust type since plugins are identified by name, not by a static type.

use crate::error::{KernelError, LifecycleError};
use crate::lifecycle::LifecycleManager;
use crate::plugin::context::DependencyApi;
use crate::plugin::PluginDescriptor;
use crate::registry::PluginRegistry;
use crate::resolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type SharedRegistry = Arc<Mutex<PluginRegistry>>;

/// Kernel-wide configuration (§6).
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub auto_global: bool,
    pub strict_versioning: bool,
    pub circular_dependencies: bool,
    pub initialization_timeout: Duration,
    pub extensions_enabled: bool,
    pub log_level: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            auto_global: false,
            strict_versioning: true,
            circular_dependencies: false,
            initialization_timeout: Duration::from_secs(30),
            extensions_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

/// Collects plugin descriptors and configuration before the kernel starts.
pub struct KernelBuilder {
    descriptors: Vec<PluginDescriptor>,
    config: KernelConfig,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        KernelBuilder {
            descriptors: Vec::new(),
            config: KernelConfig::default(),
        }
    }
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a plugin descriptor. Order of calls seeds tie-breaking and
    /// proxy/extension registration order; the resolver still reorders by
    /// dependency.
    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub async fn build(self) -> Result<Kernel, KernelError> {
        let mut registry = PluginRegistry::new();
        for descriptor in &self.descriptors {
            registry.register(descriptor.clone())?;
        }
        Ok(Kernel {
            registry: Arc::new(Mutex::new(registry)),
            descriptors: self.descriptors,
            config: self.config,
            started: false,
            init_order: Vec::new(),
        })
    }
}

/// The running (or not-yet-started) kernel.
pub struct Kernel {
    registry: SharedRegistry,
    descriptors: Vec<PluginDescriptor>,
    config: KernelConfig,
    started: bool,
    init_order: Vec<String>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("descriptors", &self.descriptors)
            .field("config", &self.config)
            .field("started", &self.started)
            .field("init_order", &self.init_order)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Resolves dependency order and drives every plugin through
    /// `UNLOADED -> LOADING -> LOADED` (§4.6). Aborts with
    /// `KERNEL_INITIALIZATION_ERROR` on the first required failure.
    pub async fn start(&mut self) -> Result<(), KernelError> {
        let resolution = resolver::resolve(
            &self.descriptors,
            self.config.strict_versioning,
            self.config.circular_dependencies,
        )?;
        for warning in &resolution.warnings {
            tracing::warn!(%warning, "dependency resolution warning");
        }
        let manager = LifecycleManager::new(self.registry.clone(), self.config.clone());
        manager.run(&self.descriptors, &resolution.order).await?;
        self.init_order = resolution.order;
        self.started = true;
        Ok(())
    }

    /// Returns the resolved dependency API for a loaded plugin, decorated
    /// with its store and metadata, or `None` if it isn't loaded.
    pub async fn get(&self, plugin_id: &str) -> Option<DependencyApi> {
        let registry = self.registry.lock().await;
        let descriptor = registry.descriptor(plugin_id)?;
        let instance = registry.instance(plugin_id)?;
        let api = instance.current_api.clone()?;
        Some(DependencyApi {
            api,
            meta: descriptor.metadata.clone(),
            store: instance.store.clone(),
        })
    }

    pub async fn state(&self, plugin_id: &str) -> Option<crate::plugin::PluginState> {
        self.registry.lock().await.state(plugin_id)
    }

    /// Runs every loaded plugin's `onShutdown` hook in reverse dependency
    /// order. Hook failures are logged, not aborting (§4.6 "Shutdown"); a
    /// misbehaving plugin should not prevent its neighbors from unwinding.
    pub async fn shutdown(&mut self) -> Result<(), KernelError> {
        if !self.started {
            return Err(KernelError::from(LifecycleError::UnknownPlugin(
                "kernel has not been started".to_string(),
            )));
        }
        let manager = LifecycleManager::new(self.registry.clone(), self.config.clone());
        manager.shutdown(&self.descriptors, &self.init_order).await;
        self.started = false;
        Ok(())
    }
}

//! Plugin orchestration kernel: dependency resolution, lifecycle
//! management, extension/proxy composition and a reactive per-plugin
//! store.
//!
//! Start at [`kernel::KernelBuilder`]: register plugin descriptors built
//! with [`plugin::plugin`], call `.build()` then `.start()`, and interact
//! with loaded plugins through [`kernel::Kernel::get`].

pub mod diagnostics;
pub mod error;
pub mod extension;
pub mod kernel;
pub mod lifecycle;
pub mod plugin;
pub mod proxy;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod store;
pub mod version;

pub use error::{KernelError, KernelErrorKind, Result};
pub use kernel::{Kernel, KernelBuilder, KernelConfig};
pub use plugin::{plugin, PluginApi, PluginBuilder, PluginDescriptor, PluginState};
pub use proxy::{ProxyConfig, ProxyTarget};
pub use store::{Store, StoreOptions};

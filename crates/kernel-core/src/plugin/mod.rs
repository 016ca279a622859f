//! Plugin descriptors, the erased API model, dependency declarations, and
//! per-instance lifecycle state (§3).

pub mod api;
pub mod builder;
pub mod context;
pub mod dependency;
pub mod descriptor;
pub mod instance;

pub use api::{ApiArgs, ApiFuture, ApiMethod, PluginApi};
pub use builder::{plugin, PluginBuilder};
pub use context::{DependencyApi, PluginContext};
pub use dependency::Dependency;
pub use descriptor::PluginDescriptor;
pub use instance::{PluginInstance, PluginState};

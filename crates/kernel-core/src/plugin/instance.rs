//! Mutable per-plugin state tracked across the lifecycle (§3, §4.2).

use crate::plugin::api::PluginApi;
use crate::store::Store;
use std::time::SystemTime;

/// A plugin's state machine, per §4.2.
///
/// ```text
/// UNLOADED ──register──▶ UNLOADED
/// UNLOADED ──begin init──▶ LOADING
/// LOADING ──setup ok + wrap ok──▶ LOADED
/// LOADING ──throw──▶ ERROR
/// LOADED ──onShutdown────▶ DESTROYED
/// any ──fatal kernel error──▶ ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Error,
    Destroyed,
}

/// Lifecycle instance: everything about a plugin that exists only once it
/// has been registered, as opposed to the immutable [`PluginDescriptor`](crate::plugin::descriptor::PluginDescriptor).
pub struct PluginInstance {
    pub state: PluginState,
    pub original_api: Option<PluginApi>,
    pub current_api: Option<PluginApi>,
    pub store: Store,
    pub error: Option<String>,
    pub registered_at: SystemTime,
    pub loaded_at: Option<SystemTime>,
    pub ready_at: Option<SystemTime>,
    pub shutdown_at: Option<SystemTime>,
}

impl PluginInstance {
    pub fn new(store: Store) -> Self {
        PluginInstance {
            state: PluginState::Unloaded,
            original_api: None,
            current_api: None,
            store,
            error: None,
            registered_at: SystemTime::now(),
            loaded_at: None,
            ready_at: None,
            shutdown_at: None,
        }
    }
}

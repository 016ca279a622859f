//! Plugin registry & state machine (§4.2).

use crate::error::{KernelError, RegistryError};
use crate::plugin::{PluginDescriptor, PluginInstance, PluginState};
use crate::store::Store;
use std::collections::HashMap;

/// Owns every registered descriptor and its mutable lifecycle instance.
/// Shared by the resolver (reads descriptors), the lifecycle manager (drives
/// state transitions) and the kernel facade (`get(name)`).
#[derive(Default)]
pub struct PluginRegistry {
    descriptors: HashMap<String, PluginDescriptor>,
    instances: HashMap<String, PluginInstance>,
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, creating its store immediately (§3
    /// "Lifecycles": stores are created at registration).
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), KernelError> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(KernelError::from(RegistryError::DuplicateRegistration(
                descriptor.id.clone(),
            )));
        }
        let store = Store::new(descriptor.store_initial.clone(), descriptor.store_options);
        self.order.push(descriptor.id.clone());
        self.instances.insert(descriptor.id.clone(), PluginInstance::new(store));
        self.descriptors.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn descriptor(&self, id: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(id)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.order.iter().filter_map(|id| self.descriptors.get(id))
    }

    pub fn instance(&self, id: &str) -> Option<&PluginInstance> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut PluginInstance> {
        self.instances.get_mut(id)
    }

    pub fn store(&self, id: &str) -> Option<Store> {
        self.instances.get(id).map(|i| i.store.clone())
    }

    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.instances.get(id).map(|i| i.state)
    }

    pub fn set_state(&mut self, id: &str, state: PluginState) -> Result<(), KernelError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| KernelError::from(RegistryError::UnknownPlugin(id.to_string())))?;
        instance.state = state;
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

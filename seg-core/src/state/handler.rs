use std::sync::{Arc, Mutex};

use seg_types::{ActionSource, Variant};

use super::{StateError, StateHandle, StateRegistry, StateStore, StateVariable};
use crate::lock;

/// Owns a group of variables registered as `<handler id>::<name>`.
///
/// Handlers are how subsystems (a layer, a view, a tool) publish their
/// settings. [`StateHandler::invalidate`] unregisters everything the handler
/// added and frees its id.
pub struct StateHandler {
    id: String,
    store: Arc<StateStore>,
    names: Mutex<Vec<String>>,
}

impl StateHandler {
    /// Register a handler on the primary store.
    pub fn new(registry: &StateRegistry, type_str: &str, auto_id: bool) -> Result<Self, StateError> {
        Self::in_store(registry, type_str, auto_id, Arc::clone(registry.primary()))
    }

    /// Register a handler whose variables live in `store` (usually a sandbox).
    pub fn in_store(
        registry: &StateRegistry,
        type_str: &str,
        auto_id: bool,
        store: Arc<StateStore>,
    ) -> Result<Self, StateError> {
        let id = registry.register_handler(type_str, auto_id)?;
        Ok(Self {
            id,
            store,
            names: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// `<handler id>::<name>`
    pub fn state_id(&self, name: &str) -> String {
        format!("{}::{}", self.id, name)
    }

    /// Register `var` under this handler's namespace.
    pub fn add(&self, mut var: StateVariable) -> Result<StateHandle, StateError> {
        var.set_namespace(&self.id);
        let full_id = var.id().to_string();
        let handle = self.store.register(var)?;
        lock(&self.names).push(full_id);
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Result<Variant, StateError> {
        self.store.get(&self.state_id(name))
    }

    pub fn set(&self, name: &str, value: impl Into<Variant>) -> Result<bool, StateError> {
        self.store
            .set_from_variant(&self.state_id(name), &value.into(), ActionSource::None)
    }

    /// Full ids of the variables this handler registered, in order.
    pub fn state_ids(&self) -> Vec<String> {
        lock(&self.names).clone()
    }

    /// Unregister every variable of this handler and release its id.
    pub fn invalidate(&self, registry: &StateRegistry) {
        for id in lock(&self.names).drain(..) {
            if let Err(e) = self.store.remove(&id) {
                log::warn!(target: "state", "handler {}: {}", self.id, e);
            }
        }
        registry.release_handler(&self.id);
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use seg_types::{ActionSource, SandboxId, Variant};

use super::{is_valid_state_id, StateError, StateStore};
use crate::lock;

/// The primary state store, its sandboxes and the handler id namespace.
pub struct StateRegistry {
    primary: Arc<StateStore>,
    sandboxes: Mutex<HashMap<SandboxId, Arc<StateStore>>>,
    handlers: Mutex<HandlerIds>,
}

#[derive(Default)]
struct HandlerIds {
    taken: HashSet<String>,
    counters: HashMap<String, u32>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            primary: Arc::new(StateStore::new(SandboxId::PRIMARY)),
            sandboxes: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HandlerIds::default()),
        }
    }

    pub fn primary(&self) -> &Arc<StateStore> {
        &self.primary
    }

    /// The store addressed by `sandbox`; `-1` is the primary store.
    pub fn store(&self, sandbox: SandboxId) -> Result<Arc<StateStore>, StateError> {
        if sandbox.is_primary() {
            return Ok(Arc::clone(&self.primary));
        }
        lock(&self.sandboxes)
            .get(&sandbox)
            .cloned()
            .ok_or(StateError::UnknownSandbox(sandbox))
    }

    pub fn create_sandbox(&self, sandbox: SandboxId) -> Result<Arc<StateStore>, StateError> {
        if !sandbox.is_valid_sandbox() {
            return Err(StateError::InvalidSandbox(sandbox));
        }
        let mut sandboxes = lock(&self.sandboxes);
        if sandboxes.contains_key(&sandbox) {
            return Err(StateError::DuplicateSandbox(sandbox));
        }
        let store = Arc::new(StateStore::new(sandbox));
        sandboxes.insert(sandbox, Arc::clone(&store));
        log::debug!(target: "state", "created sandbox {}", sandbox);
        Ok(store)
    }

    /// Drop a sandbox and every variable in it. Callers still holding the
    /// store keep a detached copy that no id lookup reaches.
    pub fn delete_sandbox(&self, sandbox: SandboxId) -> Result<(), StateError> {
        match lock(&self.sandboxes).remove(&sandbox) {
            Some(_) => {
                log::debug!(target: "state", "deleted sandbox {}", sandbox);
                Ok(())
            }
            None => Err(StateError::UnknownSandbox(sandbox)),
        }
    }

    pub fn has_sandbox(&self, sandbox: SandboxId) -> bool {
        sandbox.is_primary() || lock(&self.sandboxes).contains_key(&sandbox)
    }

    /// Sandbox ids in ascending order.
    pub fn sandboxes(&self) -> Vec<SandboxId> {
        let mut ids: Vec<SandboxId> = lock(&self.sandboxes).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, sandbox: SandboxId, id: &str) -> Result<Variant, StateError> {
        self.store(sandbox)?.get(id)
    }

    pub fn set_from_variant(
        &self,
        sandbox: SandboxId,
        id: &str,
        value: &Variant,
        source: ActionSource,
    ) -> Result<bool, StateError> {
        self.store(sandbox)?.set_from_variant(id, value, source)
    }

    /// Reserve a handler id. With `auto_id` a counter is appended per type
    /// (`layer0`, `layer1`, ...); otherwise `type_str` itself must be free.
    pub fn register_handler(&self, type_str: &str, auto_id: bool) -> Result<String, StateError> {
        if !is_valid_state_id(type_str) || type_str.contains("::") {
            return Err(StateError::InvalidIdentifier(type_str.to_string()));
        }
        let mut handlers = lock(&self.handlers);
        let id = if auto_id {
            loop {
                let counter = handlers.counters.entry(type_str.to_string()).or_insert(0);
                let candidate = format!("{}{}", type_str, counter);
                *counter += 1;
                if !handlers.taken.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            if handlers.taken.contains(type_str) {
                return Err(StateError::DuplicateIdentifier(type_str.to_string()));
            }
            type_str.to_string()
        };
        handlers.taken.insert(id.clone());
        Ok(id)
    }

    pub fn release_handler(&self, id: &str) -> bool {
        lock(&self.handlers).taken.remove(id)
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

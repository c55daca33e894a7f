use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use seg_types::{ActionSource, SandboxId, ValueKind, Variant};

use super::variable::{ChangeObserver, StateChange, StateVariable, SubscriptionId, DO_NOT_LOAD};
use super::{is_valid_state_id, StateError};
use crate::lock;

static NEXT_STORE_UID: AtomicU64 = AtomicU64::new(1);

/// Cached reference to a registered variable.
///
/// Handles survive as long as the variable stays registered. After
/// [`StateStore::remove`] the slot's generation moves on and every old
/// handle resolves to [`StateError::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle {
    store: u64,
    slot: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    var: Option<StateVariable>,
}

#[derive(Default)]
struct StoreInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: HashMap<String, u32>,
    signals_suspended: bool,
}

impl StoreInner {
    fn handle_of(&self, uid: u64, id: &str) -> Result<StateHandle, StateError> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| StateError::UnknownIdentifier(id.to_string()))?;
        Ok(StateHandle {
            store: uid,
            slot,
            generation: self.slots[slot as usize].generation,
        })
    }

    fn var(&self, uid: u64, h: StateHandle) -> Result<&StateVariable, StateError> {
        if h.store != uid {
            return Err(StateError::StaleHandle);
        }
        self.slots
            .get(h.slot as usize)
            .filter(|s| s.generation == h.generation)
            .and_then(|s| s.var.as_ref())
            .ok_or(StateError::StaleHandle)
    }

    fn var_mut(&mut self, uid: u64, h: StateHandle) -> Result<&mut StateVariable, StateError> {
        if h.store != uid {
            return Err(StateError::StaleHandle);
        }
        self.slots
            .get_mut(h.slot as usize)
            .filter(|s| s.generation == h.generation)
            .and_then(|s| s.var.as_mut())
            .ok_or(StateError::StaleHandle)
    }
}

type PendingSignal = (StateChange, Vec<ChangeObserver>);

/// A set of state variables addressed by id.
///
/// All access goes through one mutex. Observers are collected while the lock
/// is held and invoked after it is released, so an observer may read or
/// write the same store.
pub struct StateStore {
    uid: u64,
    sandbox: SandboxId,
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new(sandbox: SandboxId) -> Self {
        Self {
            uid: NEXT_STORE_UID.fetch_add(1, Ordering::Relaxed),
            sandbox,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub fn sandbox(&self) -> SandboxId {
        self.sandbox
    }

    /// Add a variable. The default value must satisfy its own constraint.
    pub fn register(&self, var: StateVariable) -> Result<StateHandle, StateError> {
        if !is_valid_state_id(var.id()) {
            return Err(StateError::InvalidIdentifier(var.id().to_string()));
        }
        var.validate(var.value())?;

        let mut inner = lock(&self.inner);
        if inner.index.contains_key(var.id()) {
            return Err(StateError::DuplicateIdentifier(var.id().to_string()));
        }
        let id = var.id().to_string();
        let slot = match inner.free.pop() {
            Some(slot) => {
                inner.slots[slot as usize].var = Some(var);
                slot
            }
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    var: Some(var),
                });
                (inner.slots.len() - 1) as u32
            }
        };
        inner.index.insert(id.clone(), slot);
        log::debug!(target: "state", "registered {} in sandbox {}", id, self.sandbox);
        Ok(StateHandle {
            store: self.uid,
            slot,
            generation: inner.slots[slot as usize].generation,
        })
    }

    /// Unregister a variable; outstanding handles become stale.
    pub fn remove(&self, id: &str) -> Result<StateVariable, StateError> {
        let mut inner = lock(&self.inner);
        let slot = inner
            .index
            .remove(id)
            .ok_or_else(|| StateError::UnknownIdentifier(id.to_string()))?;
        let entry = &mut inner.slots[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        let var = entry.var.take();
        inner.free.push(slot);
        var.ok_or_else(|| StateError::UnknownIdentifier(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.inner).index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner).index.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn handle(&self, id: &str) -> Result<StateHandle, StateError> {
        lock(&self.inner).handle_of(self.uid, id)
    }

    pub fn with_variable<R>(
        &self,
        id: &str,
        f: impl FnOnce(&StateVariable) -> R,
    ) -> Result<R, StateError> {
        let inner = lock(&self.inner);
        let h = inner.handle_of(self.uid, id)?;
        inner.var(self.uid, h).map(f)
    }

    pub fn with_handle<R>(
        &self,
        handle: StateHandle,
        f: impl FnOnce(&StateVariable) -> R,
    ) -> Result<R, StateError> {
        let inner = lock(&self.inner);
        inner.var(self.uid, handle).map(f)
    }

    pub fn get(&self, id: &str) -> Result<Variant, StateError> {
        self.with_variable(id, |v| v.value().clone())
    }

    pub fn get_by_handle(&self, handle: StateHandle) -> Result<Variant, StateError> {
        self.with_handle(handle, |v| v.value().clone())
    }

    pub fn kind(&self, id: &str) -> Result<ValueKind, StateError> {
        self.with_variable(id, StateVariable::kind)
    }

    /// Check a prospective value without storing it.
    pub fn validate(&self, id: &str, value: &Variant) -> Result<Variant, StateError> {
        self.with_variable(id, |v| {
            if v.is_locked() {
                return Err(StateError::Locked(v.id().to_string()));
            }
            v.validate(value)
        })?
    }

    pub fn set_from_variant(
        &self,
        id: &str,
        value: &Variant,
        source: ActionSource,
    ) -> Result<bool, StateError> {
        let handle = self.handle(id)?;
        self.set_by_handle(handle, value, source)
    }

    pub fn set_from_string(
        &self,
        id: &str,
        text: &str,
        source: ActionSource,
    ) -> Result<bool, StateError> {
        let value = self.with_variable(id, |v| v.parse(text))??;
        self.set_from_variant(id, &value, source)
    }

    /// Write through a cached handle. Returns whether the value changed;
    /// observers run only in that case.
    pub fn set_by_handle(
        &self,
        handle: StateHandle,
        value: &Variant,
        source: ActionSource,
    ) -> Result<bool, StateError> {
        let pending = {
            let mut inner = lock(&self.inner);
            let suspended = inner.signals_suspended;
            let var = inner.var_mut(self.uid, handle)?;
            if !var.set_value(value)? {
                return Ok(false);
            }
            log::trace!(target: "state", "{} = {}", var.id(), var.value());
            if suspended {
                None
            } else {
                Some(pending_signal(var, source))
            }
        };
        if let Some(signal) = pending {
            fire(vec![signal]);
        }
        Ok(true)
    }

    pub fn export_to_string(&self, id: &str) -> Result<String, StateError> {
        self.with_variable(id, StateVariable::export_to_string)
    }

    pub fn import_from_string(
        &self,
        id: &str,
        text: &str,
        source: ActionSource,
    ) -> Result<bool, StateError> {
        self.set_from_string(id, text, source)
    }

    pub fn set_locked(&self, id: &str, locked: bool) -> Result<(), StateError> {
        let mut inner = lock(&self.inner);
        let h = inner.handle_of(self.uid, id)?;
        inner.var_mut(self.uid, h)?.set_locked(locked);
        Ok(())
    }

    pub fn subscribe(
        &self,
        id: &str,
        observer: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> Result<SubscriptionId, StateError> {
        let mut inner = lock(&self.inner);
        let h = inner.handle_of(self.uid, id)?;
        Ok(inner
            .var_mut(self.uid, h)?
            .subscribe(std::sync::Arc::new(observer)))
    }

    pub fn unsubscribe(&self, id: &str, sub: SubscriptionId) -> bool {
        let mut inner = lock(&self.inner);
        match inner.handle_of(self.uid, id) {
            Ok(h) => inner
                .var_mut(self.uid, h)
                .map(|v| v.unsubscribe(sub))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Suspend or resume change notifications for the whole store.
    pub fn enable_signals(&self, enabled: bool) {
        lock(&self.inner).signals_suspended = !enabled;
    }

    pub fn signals_enabled(&self) -> bool {
        !lock(&self.inner).signals_suspended
    }

    /// Canonical strings of every project-data variable.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let inner = lock(&self.inner);
        inner
            .slots
            .iter()
            .filter_map(|s| s.var.as_ref())
            .filter(|v| v.is_project_data())
            .map(|v| (v.id().to_string(), v.export_to_string()))
            .collect()
    }

    /// Load a snapshot, highest session priority first.
    ///
    /// Every entry is parsed and validated before anything is written, so a
    /// bad entry leaves the store untouched. Unknown ids and variables marked
    /// [`DO_NOT_LOAD`] are skipped. Observers are notified once the whole
    /// snapshot has been applied. Returns the number of changed variables.
    pub fn restore(
        &self,
        snapshot: &BTreeMap<String, String>,
        source: ActionSource,
    ) -> Result<usize, StateError> {
        let pending = {
            let mut inner = lock(&self.inner);
            let mut planned = Vec::new();
            for (id, text) in snapshot {
                let h = match inner.handle_of(self.uid, id) {
                    Ok(h) => h,
                    Err(_) => {
                        log::warn!(target: "state", "snapshot entry for unknown variable '{}' skipped", id);
                        continue;
                    }
                };
                let var = inner.var(self.uid, h)?;
                if var.session_priority() == DO_NOT_LOAD {
                    continue;
                }
                let value = var.validate(&var.parse(text)?)?;
                planned.push((var.session_priority(), h, value));
            }
            planned.sort_by(|a, b| b.0.cmp(&a.0));

            let suspended = inner.signals_suspended;
            let mut pending = Vec::new();
            for (_, h, value) in planned {
                let var = inner.var_mut(self.uid, h)?;
                // Locked variables still follow the saved session.
                let was_locked = var.is_locked();
                var.set_locked(false);
                let changed = var.set_value(&value);
                var.set_locked(was_locked);
                if changed? && !suspended {
                    pending.push(pending_signal(var, source));
                }
            }
            pending
        };
        let changed = pending.len();
        fire(pending);
        Ok(changed)
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("sandbox", &self.sandbox)
            .field("len", &self.len())
            .finish()
    }
}

fn pending_signal(var: &StateVariable, source: ActionSource) -> PendingSignal {
    (
        StateChange {
            id: var.id().to_string(),
            value: var.value().clone(),
            source,
        },
        var.observers(),
    )
}

fn fire(pending: Vec<PendingSignal>) {
    for (change, observers) in pending {
        for observer in observers {
            observer(&change);
        }
    }
}

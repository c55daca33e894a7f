use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::action::{ActionContextHandle, ActionFactory, ActionHandle};
use crate::config::Config;
use crate::dispatch::{ActionDispatcher, DispatchError};
use crate::filter::{task, BackgroundTask, FilterGate, TaskHandle};
use crate::lock;
use crate::provenance::ProvenanceRecorder;
use crate::state::StateRegistry;
use crate::undo::UndoBuffer;

/// Owns every process-wide service and the dispatch thread.
///
/// Built by [`Application::start`]; there are no global singletons. Call
/// [`Application::shutdown`] when done: the dispatch thread holds a reference
/// to the application until it exits.
pub struct Application {
    config: Config,
    state: StateRegistry,
    provenance: ProvenanceRecorder,
    undo: UndoBuffer,
    gate: Arc<FilterGate>,
    factory: ActionFactory,
    dispatcher: ActionDispatcher,
    tasks: Mutex<HashMap<u64, TaskHandle>>,
    closing: AtomicBool,
}

impl Application {
    /// Build the services in dependency order and start dispatching.
    pub fn start(config: Config) -> Result<Arc<Self>, DispatchError> {
        let undo = UndoBuffer::new(config.undo_max_depth());
        undo.set_enabled(config.undo_enabled());
        let app = Arc::new(Self {
            state: StateRegistry::new(),
            provenance: ProvenanceRecorder::new(
                config.provenance_enabled(),
                config.provenance_user(),
            ),
            undo,
            gate: FilterGate::new(config.max_concurrent_filters()),
            factory: ActionFactory::with_builtins(),
            dispatcher: ActionDispatcher::new(config.queue_warn_threshold()),
            tasks: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            config,
        });
        app.dispatcher.start(Arc::clone(&app))?;
        log::info!(
            target: "dispatch",
            "application started (undo depth {}, {} concurrent filters)",
            app.undo.max_depth(),
            app.gate.max()
        );
        Ok(app)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateRegistry {
        &self.state
    }

    pub fn provenance(&self) -> &ProvenanceRecorder {
        &self.provenance
    }

    pub fn undo_buffer(&self) -> &UndoBuffer {
        &self.undo
    }

    pub fn filter_gate(&self) -> &Arc<FilterGate> {
        &self.gate
    }

    pub fn factory(&self) -> &ActionFactory {
        &self.factory
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Shorthand for `dispatcher().post`.
    pub fn post(&self, action: ActionHandle, ctx: &ActionContextHandle) {
        self.dispatcher.post(action, ctx);
    }

    /// Run `task` on its own thread once the filter gate admits it. Errors
    /// are reported through `ctx`, prefixed with the task name.
    pub fn spawn_task(
        self: &Arc<Self>,
        task: impl BackgroundTask,
        ctx: &ActionContextHandle,
    ) -> TaskHandle {
        task::spawn(self, Box::new(task), ctx)
    }

    /// Tasks that have not finished yet.
    pub fn running_tasks(&self) -> Vec<TaskHandle> {
        lock(&self.tasks).values().cloned().collect()
    }

    pub(crate) fn track_task(&self, handle: TaskHandle) {
        lock(&self.tasks).insert(handle.id(), handle);
    }

    pub(crate) fn forget_task(&self, id: u64) {
        lock(&self.tasks).remove(&id);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Drain and stop the dispatcher, then abort every task and wait for
    /// it. Tasks spawned from here on start aborted, including those
    /// spawned by actions still draining.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        for task in self.running_tasks() {
            task.raise_abort();
        }
        self.dispatcher.shutdown();
        loop {
            let tasks = self.running_tasks();
            if tasks.is_empty() {
                break;
            }
            for task in &tasks {
                task.raise_abort();
            }
            for task in &tasks {
                task.wait();
            }
        }
        log::info!(target: "dispatch", "application shut down");
    }
}

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::action::ActionContextHandle;
use crate::app::Application;
use crate::lock;
use crate::notifier::{Notifier, NotifierHandle};

use super::FilterGate;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Aborted | TaskState::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("aborted")]
    Aborted,
    #[error("{0}")]
    Failed(String),
    #[error("waiting for a task on the dispatch thread would deadlock")]
    WouldDeadlock,
}

/// A long-running computation run off the dispatch thread.
///
/// Implementations poll [`TaskControl::check_abort`] (or call
/// [`TaskControl::checkpoint`]) often enough that an abort is noticed
/// promptly.
pub trait BackgroundTask: Send + 'static {
    fn name(&self) -> &str;

    fn run_task(&mut self, ctl: &TaskControl) -> Result<(), TaskError>;
}

/// A [`BackgroundTask`] made from a closure.
pub struct FnTask<F> {
    name: String,
    body: F,
}

impl<F> FnTask<F>
where
    F: FnMut(&TaskControl) -> Result<(), TaskError> + Send + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> BackgroundTask for FnTask<F>
where
    F: FnMut(&TaskControl) -> Result<(), TaskError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run_task(&mut self, ctl: &TaskControl) -> Result<(), TaskError> {
        (self.body)(ctl)
    }
}

struct TaskShared {
    id: u64,
    name: String,
    state: Mutex<TaskState>,
    abort: AtomicBool,
    stop: AtomicBool,
    progress: AtomicU64,
    done: NotifierHandle,
    gate: Arc<FilterGate>,
}

impl TaskShared {
    fn set_state(&self, state: TaskState) {
        *lock(&self.state) = state;
    }
}

/// What a running task sees of itself.
pub struct TaskControl {
    shared: Arc<TaskShared>,
    app: Arc<Application>,
    context: ActionContextHandle,
}

impl TaskControl {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// Context of the action that started the task.
    pub fn context(&self) -> &ActionContextHandle {
        &self.context
    }

    pub fn check_abort(&self) -> bool {
        self.shared.abort.load(Ordering::SeqCst)
    }

    /// Stop asks the task to finish early but keep its partial result.
    pub fn check_stop(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// `Err(Aborted)` once an abort was raised, for use with `?`.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if self.check_abort() {
            Err(TaskError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Clamped to `[0, 1]`.
    pub fn set_progress(&self, progress: f64) {
        let p = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        self.shared.progress.store(p.to_bits(), Ordering::SeqCst);
    }
}

/// Caller-side handle of a spawned task.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        *lock(&self.shared.state)
    }

    pub fn progress(&self) -> f64 {
        f64::from_bits(self.shared.progress.load(Ordering::SeqCst))
    }

    /// Also wakes the task if it is still waiting for a gate slot.
    pub fn raise_abort(&self) {
        self.shared.abort.store(true, Ordering::SeqCst);
        self.shared.gate.wake_all();
    }

    pub fn raise_stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.shared.done.is_notified()
    }

    pub fn wait(&self) {
        self.shared.done.wait();
    }

    /// Returns `false` if the task was still running after `timeout`.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        self.shared.done.timed_wait(timeout)
    }

    /// Raise abort and block until the task has finished. Refused on the
    /// dispatch thread, where the task might be waiting on us.
    pub fn abort_and_wait(&self, app: &Application) -> Result<(), TaskError> {
        if app.dispatcher().is_dispatch_thread() {
            return Err(TaskError::WouldDeadlock);
        }
        self.raise_abort();
        self.wait();
        Ok(())
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Start `task` on its own thread. It waits for a [`FilterGate`] slot
/// before computing. Once the application is closing the task starts
/// aborted.
pub(crate) fn spawn(
    app: &Arc<Application>,
    task: Box<dyn BackgroundTask>,
    context: &ActionContextHandle,
) -> TaskHandle {
    let shared = Arc::new(TaskShared {
        id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
        name: task.name().to_string(),
        state: Mutex::new(TaskState::Created),
        abort: AtomicBool::new(false),
        stop: AtomicBool::new(false),
        progress: AtomicU64::new(0f64.to_bits()),
        done: Notifier::new(format!("task {}", task.name())),
        gate: Arc::clone(app.filter_gate()),
    });
    let handle = TaskHandle {
        shared: Arc::clone(&shared),
    };
    app.track_task(handle.clone());
    if app.is_closing() {
        log::debug!(target: "filter", "{} spawned during shutdown", shared.name);
        shared.abort.store(true, Ordering::SeqCst);
    }

    let ctl = TaskControl {
        shared: Arc::clone(&shared),
        app: Arc::clone(app),
        context: Arc::clone(context),
    };
    let spawned = thread::Builder::new()
        .name(format!("filter-{}", shared.name))
        .spawn(move || run(ctl, task));
    if let Err(e) = spawned {
        context.report_error(format!("{}: could not start thread: {}", shared.name, e));
        shared.set_state(TaskState::Failed);
        app.forget_task(shared.id);
        shared.done.notify();
    }
    handle
}

fn run(ctl: TaskControl, mut task: Box<dyn BackgroundTask>) {
    let gate = Arc::clone(&ctl.shared.gate);
    let permit = gate.acquire_or_abort(&ctl.shared.abort);

    let state = match permit {
        None => TaskState::Aborted,
        Some(permit) => {
            ctl.shared.set_state(TaskState::Running);
            log::debug!(target: "filter", "{} started ({} live)", ctl.name(), gate.live());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run_task(&ctl)));
            permit.release();
            match outcome {
                Ok(Ok(())) if ctl.check_abort() => TaskState::Aborted,
                Ok(Ok(())) => {
                    ctl.set_progress(1.0);
                    TaskState::Completed
                }
                Ok(Err(TaskError::Aborted)) => TaskState::Aborted,
                Ok(Err(e)) => {
                    ctl.context.report_error(format!("{}: {}", ctl.name(), e));
                    TaskState::Failed
                }
                Err(payload) => {
                    ctl.context.report_error(format!(
                        "{}: panicked: {}",
                        ctl.name(),
                        crate::panic_message(payload.as_ref())
                    ));
                    TaskState::Failed
                }
            }
        }
    };

    log::debug!(target: "filter", "{} finished: {:?}", ctl.name(), state);
    ctl.shared.set_state(state);
    ctl.app.forget_task(ctl.shared.id);
    ctl.shared.done.notify();
}

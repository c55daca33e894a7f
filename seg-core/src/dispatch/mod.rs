//! ActionDispatcher: any-thread interface to the dispatch thread.
//!
//! Posting is non-blocking and safe from every thread. Actions run one at a
//! time, in post order per posting thread, on a single dedicated thread.
//! The loop itself lives in [`dispatch_thread`].

mod dispatch_thread;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use seg_types::ActionStatus;
use thiserror::Error;

use crate::action::{Action, ActionContext, ActionContextHandle, ActionHandle};
use crate::app::Application;
use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("waiting for an action on the dispatch thread would deadlock")]
    WouldDeadlock,
    #[error("the dispatcher has shut down")]
    ShutDown,
    #[error("dispatch thread already started")]
    AlreadyStarted,
}

pub type PreRunObserver = Arc<dyn Fn(&dyn Action, &ActionContext) + Send + Sync>;
pub type PostRunObserver = Arc<dyn Fn(&dyn Action, &ActionContext) + Send + Sync>;

pub(crate) enum DispatchMsg {
    Run {
        action: ActionHandle,
        context: ActionContextHandle,
    },
    Batch {
        actions: Vec<ActionHandle>,
        context: ActionContextHandle,
    },
    Shutdown,
}

pub struct ActionDispatcher {
    tx: Sender<DispatchMsg>,
    rx: Mutex<Option<Receiver<DispatchMsg>>>,
    pending: AtomicUsize,
    queue_warn_threshold: usize,
    last_completed: Mutex<Option<Instant>>,
    dispatch_thread: OnceLock<ThreadId>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    /// Held shared while posting, exclusively while queueing the shutdown
    /// marker, so nothing lands behind it.
    post_gate: RwLock<()>,
    pre_run: RwLock<Vec<PreRunObserver>>,
    post_run: RwLock<Vec<PostRunObserver>>,
}

impl ActionDispatcher {
    pub(crate) fn new(queue_warn_threshold: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            pending: AtomicUsize::new(0),
            queue_warn_threshold,
            last_completed: Mutex::new(None),
            dispatch_thread: OnceLock::new(),
            join_handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
            post_gate: RwLock::new(()),
            pre_run: RwLock::new(Vec::new()),
            post_run: RwLock::new(Vec::new()),
        }
    }

    /// Spawn the dispatch thread. Called once by [`Application::start`].
    pub(crate) fn start(&self, app: Arc<Application>) -> Result<(), DispatchError> {
        let rx = lock(&self.rx).take().ok_or(DispatchError::AlreadyStarted)?;
        let join_handle = thread::Builder::new()
            .name("dispatch".into())
            .spawn(move || dispatch_thread::DispatchThread::new(rx, app).run())
            .map_err(|e| {
                log::error!(target: "dispatch", "could not spawn dispatch thread: {}", e);
                DispatchError::ShutDown
            })?;
        let _ = self.dispatch_thread.set(join_handle.thread().id());
        *lock(&self.join_handle) = Some(join_handle);
        Ok(())
    }

    /// Queue `action`. Returns immediately; completion is signalled through
    /// `ctx`. After shutdown the context is failed right away.
    pub fn post(&self, action: ActionHandle, ctx: &ActionContextHandle) {
        self.enqueue(
            1,
            DispatchMsg::Run {
                action,
                context: Arc::clone(ctx),
            },
            ctx,
        );
    }

    /// Queue `actions` to run back to back with no other action in between.
    /// `ctx` receives every report and one final completion.
    pub fn post_actions(&self, actions: Vec<ActionHandle>, ctx: &ActionContextHandle) {
        if actions.is_empty() {
            ctx.report_done();
            return;
        }
        self.enqueue(
            actions.len(),
            DispatchMsg::Batch {
                actions,
                context: Arc::clone(ctx),
            },
            ctx,
        );
    }

    /// Post and block until the action has finished.
    pub fn post_and_wait(
        &self,
        action: ActionHandle,
        ctx: &ActionContextHandle,
    ) -> Result<ActionStatus, DispatchError> {
        if self.is_dispatch_thread() {
            return Err(DispatchError::WouldDeadlock);
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }
        self.post(action, ctx);
        ctx.wait_done();
        Ok(ctx.status())
    }

    fn enqueue(&self, count: usize, msg: DispatchMsg, ctx: &ActionContextHandle) {
        let queued = {
            let _posting = self.post_gate.read().unwrap_or_else(|e| e.into_inner());
            if self.stopped.load(Ordering::SeqCst) {
                false
            } else {
                let queued = self.pending.fetch_add(count, Ordering::SeqCst) + count;
                if queued > self.queue_warn_threshold {
                    log::warn!(target: "dispatch", "{} actions queued", queued);
                }
                let sent = self.tx.send(msg).is_ok();
                if !sent {
                    self.pending.fetch_sub(count, Ordering::SeqCst);
                }
                sent
            }
        };
        if !queued {
            reject_after_shutdown(ctx);
        }
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.dispatch_thread.get() == Some(&thread::current().id())
    }

    /// Whether any posted action has not completed yet.
    pub fn is_busy(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// When the most recent action finished, if any has.
    pub fn last_completed(&self) -> Option<Instant> {
        *lock(&self.last_completed)
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Called on the dispatch thread after validation, before `run`.
    pub fn on_pre_run(&self, observer: impl Fn(&dyn Action, &ActionContext) + Send + Sync + 'static) {
        self.pre_run
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(observer));
    }

    /// Called on the dispatch thread after a successful run.
    pub fn on_post_run(&self, observer: impl Fn(&dyn Action, &ActionContext) + Send + Sync + 'static) {
        self.post_run
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(observer));
    }

    pub(crate) fn pre_run_observers(&self) -> Vec<PreRunObserver> {
        self.pre_run.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn post_run_observers(&self) -> Vec<PostRunObserver> {
        self.post_run.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn complete_one(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        *lock(&self.last_completed) = Some(Instant::now());
    }

    /// Stop accepting posts, drain what is queued and join the thread.
    pub fn shutdown(&self) {
        {
            let _closing = self.post_gate.write().unwrap_or_else(|e| e.into_inner());
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            let _ = self.tx.send(DispatchMsg::Shutdown);
        }
        if self.is_dispatch_thread() {
            return;
        }
        if let Some(handle) = lock(&self.join_handle).take() {
            if handle.join().is_err() {
                log::error!(target: "dispatch", "dispatch thread panicked");
            }
        }
        log::debug!(target: "dispatch", "dispatcher stopped");
    }
}

fn reject_after_shutdown(ctx: &ActionContextHandle) {
    ctx.report_error(DispatchError::ShutDown.to_string());
    ctx.report_status(ActionStatus::Error);
    ctx.report_done();
}


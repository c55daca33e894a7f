use std::sync::{Arc, Mutex};
use std::time::Duration;

use seg_types::{ActionSource, ActionStatus, ProvenanceId, Variant};

use crate::lock;
use crate::notifier::{Notifier, NotifierHandle};

/// Receives what an action reports while it is dispatched.
///
/// The defaults log through the `action` target; interfaces override the
/// methods they want to show to a user.
pub trait ReportSink: Send + Sync {
    fn error(&self, message: &str) {
        log::error!(target: "action", "{}", message);
    }

    fn warning(&self, message: &str) {
        log::warn!(target: "action", "{}", message);
    }

    fn message(&self, message: &str) {
        log::info!(target: "action", "{}", message);
    }

    fn need_resource(&self, notifier: &NotifierHandle) {
        log::debug!(target: "action", "waiting on resource '{}'", notifier.name());
    }

    fn done(&self, _status: ActionStatus, _result: Option<&Variant>) {}
}

/// Sink that only logs.
pub struct LogSink;

impl ReportSink for LogSink {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Error(String),
    Warning(String),
    Message(String),
}

struct ContextState {
    status: ActionStatus,
    error: String,
    result: Option<Variant>,
    resource: Option<NotifierHandle>,
    provenance_id: Option<ProvenanceId>,
    reports: Vec<Report>,
}

pub type ActionContextHandle = Arc<ActionContext>;

/// The caller's side of one dispatch: where the action came from, where its
/// reports go and how it ended.
///
/// A derived context forwards its reports to the parent but keeps its own
/// status, result and completion signal.
pub struct ActionContext {
    source: ActionSource,
    sink: Arc<dyn ReportSink>,
    parent: Option<ActionContextHandle>,
    state: Mutex<ContextState>,
    done: NotifierHandle,
}

impl ActionContext {
    pub fn new(source: ActionSource) -> ActionContextHandle {
        Self::with_sink(source, Arc::new(LogSink))
    }

    pub fn with_sink(source: ActionSource, sink: Arc<dyn ReportSink>) -> ActionContextHandle {
        Arc::new(Self::build(source, sink, None))
    }

    pub fn derived(parent: &ActionContextHandle, source: ActionSource) -> ActionContextHandle {
        Arc::new(Self::build(
            source,
            Arc::clone(&parent.sink),
            Some(Arc::clone(parent)),
        ))
    }

    fn build(
        source: ActionSource,
        sink: Arc<dyn ReportSink>,
        parent: Option<ActionContextHandle>,
    ) -> Self {
        Self {
            source,
            sink,
            parent,
            state: Mutex::new(ContextState {
                status: ActionStatus::Success,
                error: String::new(),
                result: None,
                resource: None,
                provenance_id: None,
                reports: Vec::new(),
            }),
            done: Notifier::new("action done"),
        }
    }

    pub fn source(&self) -> ActionSource {
        self.source
    }

    pub fn report_error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        {
            let mut state = lock(&self.state);
            if !state.error.is_empty() {
                state.error.push('\n');
            }
            state.error.push_str(message);
            state.reports.push(Report::Error(message.to_string()));
        }
        match &self.parent {
            Some(parent) => parent.report_error(message),
            None => self.sink.error(message),
        }
    }

    pub fn report_warning(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        lock(&self.state)
            .reports
            .push(Report::Warning(message.to_string()));
        match &self.parent {
            Some(parent) => parent.report_warning(message),
            None => self.sink.warning(message),
        }
    }

    pub fn report_message(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        lock(&self.state)
            .reports
            .push(Report::Message(message.to_string()));
        match &self.parent {
            Some(parent) => parent.report_message(message),
            None => self.sink.message(message),
        }
    }

    /// Marks the dispatch as unavailable until `notifier` fires.
    pub fn report_need_resource(&self, notifier: NotifierHandle) {
        {
            let mut state = lock(&self.state);
            state.status = ActionStatus::Unavailable;
            state.resource = Some(Arc::clone(&notifier));
        }
        match &self.parent {
            Some(parent) => parent.report_need_resource(notifier),
            None => self.sink.need_resource(&notifier),
        }
    }

    pub fn report_status(&self, status: ActionStatus) {
        lock(&self.state).status = status;
    }

    pub fn report_result(&self, result: Variant) {
        lock(&self.state).result = Some(result);
    }

    /// Final call of every dispatch. Wakes [`ActionContext::wait_done`].
    ///
    /// Only a root context tells the sink; a derived context finishing is
    /// one step of its parent's dispatch.
    pub fn report_done(&self) {
        if self.parent.is_none() {
            let (status, result) = {
                let state = lock(&self.state);
                (state.status, state.result.clone())
            };
            self.sink.done(status, result.as_ref());
        }
        self.done.notify();
    }

    pub(crate) fn set_provenance_id(&self, id: ProvenanceId) {
        lock(&self.state).provenance_id = Some(id);
    }

    pub fn status(&self) -> ActionStatus {
        lock(&self.state).status
    }

    pub fn is_success(&self) -> bool {
        self.status() == ActionStatus::Success
    }

    pub fn error_message(&self) -> String {
        lock(&self.state).error.clone()
    }

    pub fn result(&self) -> Option<Variant> {
        lock(&self.state).result.clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        lock(&self.state).reports.clone()
    }

    pub fn resource_notifier(&self) -> Option<NotifierHandle> {
        lock(&self.state).resource.clone()
    }

    pub fn provenance_id(&self) -> Option<ProvenanceId> {
        lock(&self.state).provenance_id
    }

    pub fn is_done(&self) -> bool {
        self.done.is_notified()
    }

    pub fn wait_done(&self) {
        self.done.wait();
    }

    /// Returns `false` if the dispatch did not finish within `timeout`.
    pub fn wait_done_timeout(&self, timeout: Duration) -> bool {
        self.done.timed_wait(timeout)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("source", &self.source)
            .field("status", &self.status())
            .field("derived", &self.parent.is_some())
            .finish()
    }
}

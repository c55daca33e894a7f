//! Actions: the only way state changes.
//!
//! Every change, whatever its source (interface, script, command line,
//! undo replay), is an [`Action`] posted to the
//! [`ActionDispatcher`](crate::dispatch::ActionDispatcher) and run on the
//! dispatch thread in three steps: `translate`, `validate`, `run`.

pub mod context;
pub mod factory;
pub mod history;
pub mod sandbox;
pub mod state;

use std::sync::Arc;

use seg_types::{ActionInfo, ProvenanceId, Variant};

use crate::app::Application;

pub use context::{ActionContext, ActionContextHandle, LogSink, Report, ReportSink};
pub use factory::{ActionFactory, FactoryError};
pub use history::{ActionClearUndoBuffer, ActionRedo, ActionUndo};
pub use sandbox::{ActionCreateSandbox, ActionDeleteSandbox};
pub use state::{ActionGet, ActionOffset, ActionSet};

/// Boxed action as it travels through the dispatcher and the undo buffer.
pub type ActionHandle = Box<dyn Action>;

pub trait Action: Send {
    fn info(&self) -> &'static ActionInfo;

    /// Current parameter values in declaration order, as canonical strings.
    fn param_values(&self) -> Vec<String>;

    /// Resolve loosely specified parameters into concrete ones.
    fn translate(&mut self, _app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        true
    }

    /// Check preconditions. Must not change state. Returning `false` makes
    /// the dispatch a no-op; reasons go to `ctx`.
    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool;

    /// Perform the change. A `false` return must leave state as it was.
    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        result: &mut Option<Variant>,
    ) -> bool;

    /// Drop anything cached during validate/run; called after every dispatch.
    fn clear_cache(&mut self) {}

    fn type_name(&self) -> &'static str {
        self.info().type_name
    }

    fn changes_project_data(&self) -> bool {
        self.info().changes_project_data
    }

    fn is_undoable(&self) -> bool {
        self.info().undoable
    }

    /// Provenance ids of the data this action consumes.
    fn provenance_inputs(&self) -> Vec<ProvenanceId> {
        Vec::new()
    }

    fn export_to_string(&self) -> String {
        self.info()
            .to_command(&self.param_values(), false)
            .to_string()
    }

    /// Export without non-persistent parameters, for session files and
    /// provenance records.
    fn export_persistent(&self) -> String {
        self.info().to_command(&self.param_values(), true).to_string()
    }
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.export_to_string())
    }
}

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use seg_types::{ActionSource, ActionStatus};

use super::DispatchMsg;
use crate::action::{Action, ActionContext, ActionContextHandle, ActionHandle};
use crate::app::Application;
use crate::provenance::ProvenanceStep;

pub(super) struct DispatchThread {
    rx: Receiver<DispatchMsg>,
    app: Arc<Application>,
}

impl DispatchThread {
    pub(super) fn new(rx: Receiver<DispatchMsg>, app: Arc<Application>) -> Self {
        Self { rx, app }
    }

    pub(super) fn run(self) {
        log::debug!(target: "dispatch", "dispatch thread started");
        for msg in self.rx.iter() {
            match msg {
                DispatchMsg::Run {
                    mut action,
                    context,
                } => {
                    self.run_action(&mut action, &context);
                    self.app.dispatcher().complete_one();
                }
                DispatchMsg::Batch { actions, context } => self.run_batch(actions, &context),
                DispatchMsg::Shutdown => break,
            }
        }
        log::debug!(target: "dispatch", "dispatch thread exiting");
    }

    /// Run every action of a batch under a derived context. The batch context
    /// ends with the first non-success status, or success, and the last
    /// result.
    fn run_batch(&self, actions: Vec<ActionHandle>, context: &ActionContextHandle) {
        let mut status = ActionStatus::Success;
        let mut last_result = None;
        for mut action in actions {
            let step = ActionContext::derived(context, context.source());
            let step_status = self.run_action(&mut action, &step);
            if status == ActionStatus::Success {
                status = step_status;
            }
            if let Some(result) = step.result() {
                last_result = Some(result);
            }
            self.app.dispatcher().complete_one();
        }
        if let Some(result) = last_result {
            context.report_result(result);
        }
        context.report_status(status);
        context.report_done();
    }

    /// translate, validate, run, then report and record.
    fn run_action(&self, action: &mut ActionHandle, ctx: &ActionContextHandle) -> ActionStatus {
        let app = &self.app;
        log::debug!(target: "dispatch", "[{}] {}", ctx.source().as_str(), action.export_to_string());

        match guarded(ctx, action.type_name(), "translate", || action.translate(app, ctx)) {
            Some(true) => {}
            Some(false) => return reject(action, ctx),
            None => return fail(action, ctx),
        }
        match guarded(ctx, action.type_name(), "validate", || action.validate(app, ctx)) {
            Some(true) => {}
            Some(false) => return reject(action, ctx),
            None => return fail(action, ctx),
        }

        for observer in app.dispatcher().pre_run_observers() {
            observer(&**action, &**ctx);
        }

        let changes_project_data = action.changes_project_data();
        if changes_project_data
            && !ctx.source().is_replay()
            && app.provenance().is_enabled()
        {
            ctx.set_provenance_id(app.provenance().generate());
        }

        let mut result = None;
        match guarded(ctx, action.type_name(), "run", || action.run(app, ctx, &mut result)) {
            Some(true) => {}
            Some(false) | None => return fail(action, ctx),
        }

        if let Some(result) = result {
            ctx.report_result(result);
        }
        ctx.report_status(ActionStatus::Success);

        // History is settled before waiters wake up.
        if changes_project_data
            && !action.is_undoable()
            && ctx.source() != ActionSource::UndoBuffer
        {
            app.undo_buffer().invalidate_redo();
        }
        if let Some(id) = ctx.provenance_id() {
            app.provenance().record(ProvenanceStep::new(
                id,
                action.export_persistent(),
                action.provenance_inputs(),
                app.provenance().user().to_string(),
            ));
        }
        ctx.report_done();
        action.clear_cache();

        for observer in app.dispatcher().post_run_observers() {
            observer(&**action, &**ctx);
        }
        ActionStatus::Success
    }
}

/// Validation failed: a no-op dispatch. A resource wait keeps its status.
fn reject(action: &mut ActionHandle, ctx: &ActionContextHandle) -> ActionStatus {
    if ctx.status() != ActionStatus::Unavailable {
        ctx.report_status(ActionStatus::Invalid);
    }
    let status = ctx.status();
    ctx.report_done();
    action.clear_cache();
    status
}

fn fail(action: &mut ActionHandle, ctx: &ActionContextHandle) -> ActionStatus {
    ctx.report_status(ActionStatus::Error);
    ctx.report_done();
    action.clear_cache();
    ActionStatus::Error
}

/// Run one step, turning a panic into a reported error (`None`).
fn guarded(
    ctx: &ActionContextHandle,
    type_name: &str,
    step: &str,
    f: impl FnOnce() -> bool,
) -> Option<bool> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(ok) => Some(ok),
        Err(payload) => {
            let message = format!(
                "{} panicked during {}: {}",
                type_name,
                step,
                crate::panic_message(payload.as_ref())
            );
            log::error!(target: "dispatch", "{}", message);
            ctx.report_error(message);
            None
        }
    }
}

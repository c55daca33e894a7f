//! undo / redo / clearundobuffer.

use std::sync::Arc;

use seg_types::{ActionInfo, BoundParams, Variant};

use super::{Action, ActionContextHandle, ActionHandle, FactoryError};
use crate::app::Application;

pub static UNDO_INFO: ActionInfo = ActionInfo {
    type_name: "undo",
    description: "Undo the last undoable action.",
    params: &[],
    undoable: false,
    changes_project_data: false,
};

pub static REDO_INFO: ActionInfo = ActionInfo {
    type_name: "redo",
    description: "Redo the last undone action.",
    params: &[],
    undoable: false,
    changes_project_data: false,
};

pub static CLEAR_UNDO_INFO: ActionInfo = ActionInfo {
    type_name: "clearundobuffer",
    description: "Forget every undo and redo checkpoint.",
    params: &[],
    undoable: false,
    changes_project_data: false,
};

#[derive(Default)]
pub struct ActionUndo;

impl ActionUndo {
    pub fn from_params(_params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(Self))
    }
}

impl Action for ActionUndo {
    fn info(&self) -> &'static ActionInfo {
        &UNDO_INFO
    }

    fn param_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&mut self, _app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        app.undo_buffer().undo(app, ctx)
    }
}

#[derive(Default)]
pub struct ActionRedo;

impl ActionRedo {
    pub fn from_params(_params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(Self))
    }
}

impl Action for ActionRedo {
    fn info(&self) -> &'static ActionInfo {
        &REDO_INFO
    }

    fn param_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&mut self, _app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        app.undo_buffer().redo(app, ctx)
    }
}

#[derive(Default)]
pub struct ActionClearUndoBuffer;

impl ActionClearUndoBuffer {
    pub fn from_params(_params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(Self))
    }
}

impl Action for ActionClearUndoBuffer {
    fn info(&self) -> &'static ActionInfo {
        &CLEAR_UNDO_INFO
    }

    fn param_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&mut self, _app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        _ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        app.undo_buffer().reset();
        true
    }
}

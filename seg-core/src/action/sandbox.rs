//! createsandbox / deletesandbox.

use std::sync::Arc;

use seg_types::{ActionInfo, BoundParams, ParamSpec, SandboxId, Variant};

use super::{Action, ActionContextHandle, ActionHandle, FactoryError};
use crate::app::Application;

const SANDBOX_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "sandbox",
    "Sandbox id, a non-negative integer.",
)];

pub static CREATE_INFO: ActionInfo = ActionInfo {
    type_name: "createsandbox",
    description: "Create an isolated state sandbox.",
    params: SANDBOX_PARAMS,
    undoable: false,
    changes_project_data: false,
};

pub static DELETE_INFO: ActionInfo = ActionInfo {
    type_name: "deletesandbox",
    description: "Delete a state sandbox and everything in it.",
    params: SANDBOX_PARAMS,
    undoable: false,
    changes_project_data: false,
};

fn parse_sandbox(info: &'static ActionInfo, params: &BoundParams) -> Result<SandboxId, FactoryError> {
    let text = params.get("sandbox").unwrap_or_default();
    text.parse::<SandboxId>()
        .map_err(|_| FactoryError::invalid(info, "sandbox", text))
}

pub struct ActionCreateSandbox {
    sandbox: SandboxId,
}

impl ActionCreateSandbox {
    pub fn new(sandbox: SandboxId) -> Self {
        Self { sandbox }
    }

    pub fn from_params(params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(Self::new(parse_sandbox(&CREATE_INFO, params)?)))
    }
}

impl Action for ActionCreateSandbox {
    fn info(&self) -> &'static ActionInfo {
        &CREATE_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![self.sandbox.to_string()]
    }

    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        if !self.sandbox.is_valid_sandbox() {
            ctx.report_error(format!("invalid sandbox id {}", self.sandbox));
            return false;
        }
        if app.state().has_sandbox(self.sandbox) {
            ctx.report_error(format!("sandbox {} already exists", self.sandbox));
            return false;
        }
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        match app.state().create_sandbox(self.sandbox) {
            Ok(_) => true,
            Err(e) => {
                ctx.report_error(e.to_string());
                false
            }
        }
    }
}

pub struct ActionDeleteSandbox {
    sandbox: SandboxId,
}

impl ActionDeleteSandbox {
    pub fn new(sandbox: SandboxId) -> Self {
        Self { sandbox }
    }

    pub fn from_params(params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(Self::new(parse_sandbox(&DELETE_INFO, params)?)))
    }
}

impl Action for ActionDeleteSandbox {
    fn info(&self) -> &'static ActionInfo {
        &DELETE_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![self.sandbox.to_string()]
    }

    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        if self.sandbox.is_primary() || !app.state().has_sandbox(self.sandbox) {
            ctx.report_error(format!("sandbox {} does not exist", self.sandbox));
            return false;
        }
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        match app.state().delete_sandbox(self.sandbox) {
            Ok(()) => true,
            Err(e) => {
                ctx.report_error(e.to_string());
                false
            }
        }
    }
}

//! set / get / offset on state variables.

use std::sync::Arc;

use seg_types::{ActionInfo, BoundParams, ParamSpec, SandboxId, ValueError, ValueKind, Variant};

use super::{Action, ActionContextHandle, ActionHandle, FactoryError};
use crate::app::Application;
use crate::state::{StateError, StateHandle, StateStore};
use crate::undo::UndoBufferItem;

const SET_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("stateid", "The id of the state variable."),
    ParamSpec::required("value", "The new value of the state variable."),
    ParamSpec::key("sandbox", "-1", "The sandbox in which to run the action."),
];

pub static SET_INFO: ActionInfo = ActionInfo {
    type_name: "set",
    description: "Set the value of a state variable.",
    params: SET_PARAMS,
    undoable: true,
    changes_project_data: true,
};

const GET_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("stateid", "The id of the state variable."),
    ParamSpec::key("sandbox", "-1", "The sandbox in which to run the action."),
];

pub static GET_INFO: ActionInfo = ActionInfo {
    type_name: "get",
    description: "Get the value of a state variable.",
    params: GET_PARAMS,
    undoable: false,
    changes_project_data: false,
};

const OFFSET_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("stateid", "The id of a numeric state variable."),
    ParamSpec::required("offset", "Amount added to the current value."),
    ParamSpec::key("sandbox", "-1", "The sandbox in which to run the action."),
];

pub static OFFSET_INFO: ActionInfo = ActionInfo {
    type_name: "offset",
    description: "Add an offset to a numeric state variable.",
    params: OFFSET_PARAMS,
    undoable: true,
    changes_project_data: true,
};

pub(super) fn sandbox_param(
    info: &'static ActionInfo,
    params: &BoundParams,
) -> Result<SandboxId, FactoryError> {
    let text = params.get("sandbox").unwrap_or("-1");
    text.parse::<SandboxId>()
        .map_err(|_| FactoryError::invalid(info, "sandbox", text))
}

fn required<'a>(
    info: &'static ActionInfo,
    params: &'a BoundParams,
    name: &'static str,
) -> Result<&'a str, FactoryError> {
    params
        .get(name)
        .ok_or_else(|| FactoryError::invalid(info, name, ""))
}

/// Resolve `stateid` in `sandbox`, reusing a cached handle when present.
fn resolve(
    app: &Application,
    ctx: &ActionContextHandle,
    sandbox: SandboxId,
    stateid: &str,
    cached: Option<StateHandle>,
) -> Option<(Arc<StateStore>, StateHandle)> {
    let lookup = app.state().store(sandbox).and_then(|store| {
        let handle = match cached {
            Some(h) => h,
            None => store.handle(stateid)?,
        };
        Ok((store, handle))
    });
    match lookup {
        Ok(found) => Some(found),
        Err(e) => {
            ctx.report_error(e.to_string());
            None
        }
    }
}

fn report<T>(ctx: &ActionContextHandle, result: Result<T, StateError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            ctx.report_error(e.to_string());
            None
        }
    }
}

/// Set a state variable from any convertible value.
pub struct ActionSet {
    stateid: String,
    value: Variant,
    sandbox: SandboxId,
    handle: Option<StateHandle>,
    project_data: bool,
}

impl ActionSet {
    pub fn new(stateid: impl Into<String>, value: impl Into<Variant>) -> Self {
        Self {
            stateid: stateid.into(),
            value: value.into(),
            sandbox: SandboxId::PRIMARY,
            handle: None,
            project_data: false,
        }
    }

    pub fn in_sandbox(mut self, sandbox: SandboxId) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn from_params(params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(
            Self::new(
                required(&SET_INFO, params, "stateid")?,
                required(&SET_INFO, params, "value")?,
            )
            .in_sandbox(sandbox_param(&SET_INFO, params)?),
        ))
    }

    /// Post a set from the calling thread.
    pub fn dispatch(
        app: &Application,
        ctx: &ActionContextHandle,
        stateid: impl Into<String>,
        value: impl Into<Variant>,
    ) {
        app.dispatcher()
            .post(Box::new(Self::new(stateid, value)), ctx);
    }
}

impl Action for ActionSet {
    fn info(&self) -> &'static ActionInfo {
        &SET_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![
            self.stateid.clone(),
            self.value.to_string(),
            self.sandbox.to_string(),
        ]
    }

    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        let Some((store, handle)) = resolve(app, ctx, self.sandbox, &self.stateid, self.handle)
        else {
            return false;
        };
        let value = &self.value;
        let checked = store.with_handle(handle, |var| {
            if var.is_locked() {
                return Err(StateError::Locked(var.id().to_string()));
            }
            var.validate(value).map(|_| var.is_project_data())
        });
        let Some(project_data) = report(ctx, checked.and_then(|r| r)) else {
            return false;
        };
        self.handle = Some(handle);
        self.project_data = project_data && self.sandbox.is_primary();
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        let Some((store, handle)) = resolve(app, ctx, self.sandbox, &self.stateid, self.handle)
        else {
            return false;
        };
        let Some(old) = report(ctx, store.get_by_handle(handle)) else {
            return false;
        };
        let Some(changed) = report(ctx, store.set_by_handle(handle, &self.value, ctx.source()))
        else {
            return false;
        };
        if changed && self.project_data {
            app.undo_buffer().insert(
                ctx,
                UndoBufferItem::new(
                    format!("Set {}", self.stateid),
                    ActionSet::new(&self.stateid, old),
                    ActionSet::new(&self.stateid, self.value.clone()),
                ),
            );
        }
        true
    }

    fn clear_cache(&mut self) {
        self.handle = None;
    }

    fn changes_project_data(&self) -> bool {
        self.project_data
    }
}

/// Read a state variable; the value is the dispatch result.
pub struct ActionGet {
    stateid: String,
    sandbox: SandboxId,
    handle: Option<StateHandle>,
}

impl ActionGet {
    pub fn new(stateid: impl Into<String>) -> Self {
        Self {
            stateid: stateid.into(),
            sandbox: SandboxId::PRIMARY,
            handle: None,
        }
    }

    pub fn in_sandbox(mut self, sandbox: SandboxId) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn from_params(params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        Ok(Box::new(
            Self::new(required(&GET_INFO, params, "stateid")?)
                .in_sandbox(sandbox_param(&GET_INFO, params)?),
        ))
    }
}

impl Action for ActionGet {
    fn info(&self) -> &'static ActionInfo {
        &GET_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![self.stateid.clone(), self.sandbox.to_string()]
    }

    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        match resolve(app, ctx, self.sandbox, &self.stateid, self.handle) {
            Some((_, handle)) => {
                self.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        result: &mut Option<Variant>,
    ) -> bool {
        let Some((store, handle)) = resolve(app, ctx, self.sandbox, &self.stateid, self.handle)
        else {
            return false;
        };
        match report(ctx, store.get_by_handle(handle)) {
            Some(value) => {
                *result = Some(value);
                true
            }
            None => false,
        }
    }

    fn clear_cache(&mut self) {
        self.handle = None;
    }
}

/// Add a number to an int or double variable.
pub struct ActionOffset {
    stateid: String,
    offset: f64,
    sandbox: SandboxId,
    handle: Option<StateHandle>,
    project_data: bool,
}

impl ActionOffset {
    pub fn new(stateid: impl Into<String>, offset: f64) -> Self {
        Self {
            stateid: stateid.into(),
            offset,
            sandbox: SandboxId::PRIMARY,
            handle: None,
            project_data: false,
        }
    }

    pub fn in_sandbox(mut self, sandbox: SandboxId) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn from_params(params: &BoundParams) -> Result<ActionHandle, FactoryError> {
        let text = required(&OFFSET_INFO, params, "offset")?;
        let offset = text
            .trim()
            .parse::<f64>()
            .map_err(|_| FactoryError::invalid(&OFFSET_INFO, "offset", text))?;
        Ok(Box::new(
            Self::new(required(&OFFSET_INFO, params, "stateid")?, offset)
                .in_sandbox(sandbox_param(&OFFSET_INFO, params)?),
        ))
    }

    /// Current value and the value after applying the offset.
    ///
    /// Ints with a whole offset are added exactly; everything else goes
    /// through `f64`.
    fn target(&self, store: &StateStore, handle: StateHandle) -> Result<(Variant, Variant), StateError> {
        store.with_handle(handle, |var| -> Result<(Variant, Variant), StateError> {
            let current = var.value().clone();
            let sum = match current {
                Variant::Int(base)
                    if self.offset.fract() == 0.0 && self.offset.abs() < i64::MAX as f64 =>
                {
                    let sum = base.checked_add(self.offset as i64).ok_or_else(|| {
                        StateError::OutOfRange {
                            id: var.id().to_string(),
                            value: base as f64 + self.offset,
                            min: i64::MIN as f64,
                            max: i64::MAX as f64,
                        }
                    })?;
                    Variant::Int(sum)
                }
                _ => {
                    let base = current.as_double().ok_or_else(|| StateError::Conversion {
                        id: var.id().to_string(),
                        source: ValueError::Mismatch {
                            from: current.type_name(),
                            to: ValueKind::Double,
                        },
                    })?;
                    Variant::Double(base + self.offset)
                }
            };
            let next = var.validate(&sum)?;
            Ok((current, next))
        })?
    }
}

impl Action for ActionOffset {
    fn info(&self) -> &'static ActionInfo {
        &OFFSET_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![
            self.stateid.clone(),
            self.offset.to_string(),
            self.sandbox.to_string(),
        ]
    }

    fn validate(&mut self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        let Some((store, handle)) = resolve(app, ctx, self.sandbox, &self.stateid, self.handle)
        else {
            return false;
        };
        if report(ctx, self.target(&store, handle)).is_none() {
            return false;
        }
        let Some(project_data) = report(ctx, store.with_handle(handle, |v| v.is_project_data()))
        else {
            return false;
        };
        self.handle = Some(handle);
        self.project_data = project_data && self.sandbox.is_primary();
        true
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        let Some((store, handle)) = resolve(app, ctx, self.sandbox, &self.stateid, self.handle)
        else {
            return false;
        };
        let Some((old, next)) = report(ctx, self.target(&store, handle)) else {
            return false;
        };
        let Some(changed) = report(ctx, store.set_by_handle(handle, &next, ctx.source())) else {
            return false;
        };
        if changed && self.project_data {
            app.undo_buffer().insert(
                ctx,
                UndoBufferItem::new(
                    format!("Offset {}", self.stateid),
                    ActionSet::new(&self.stateid, old),
                    ActionSet::new(&self.stateid, next),
                ),
            );
        }
        true
    }

    fn clear_cache(&mut self) {
        self.handle = None;
    }

    fn changes_project_data(&self) -> bool {
        self.project_data
    }
}

#![allow(dead_code)]
//! Test harness utilities for seg-core integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use seg_core::action::{Action, ActionContext, ActionContextHandle, ActionHandle};
use seg_core::app::Application;
use seg_core::config::Config;
use seg_core::state::{StateHandler, StateVariable};
use seg_types::{ActionInfo, ActionSource, ActionStatus, ParamSpec, Variant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Start an application with default settings overridden by `toml`.
pub fn start_with(toml: &str) -> Arc<Application> {
    let config = Config::from_toml_str(toml).expect("test config parses");
    Application::start(config).expect("dispatcher starts")
}

pub fn start_app() -> Arc<Application> {
    start_with("[provenance]\nuser = \"tester\"\n")
}

/// Register the `view` handler used across tests:
/// brightness (double 0..10, project), label (string, project),
/// count (int, project) and scratch (int, not project data).
pub fn register_view(app: &Application) -> StateHandler {
    let view = StateHandler::new(app.state(), "view", false).expect("view handler");
    view.add(
        StateVariable::new("brightness", 1.0)
            .with_range(0.0, 10.0)
            .with_project_data(true),
    )
    .expect("brightness");
    view.add(StateVariable::new("label", "none").with_project_data(true))
        .expect("label");
    view.add(StateVariable::new("count", 0).with_project_data(true))
        .expect("count");
    view.add(StateVariable::new("scratch", 0)).expect("scratch");
    view
}

pub fn script_ctx() -> ActionContextHandle {
    ActionContext::new(ActionSource::Script)
}

/// Post and wait on a fresh script context.
pub fn run(app: &Application, action: ActionHandle) -> ActionContextHandle {
    let ctx = script_ctx();
    app.dispatcher()
        .post_and_wait(action, &ctx)
        .expect("post_and_wait from a test thread");
    ctx
}

/// Parse `text` with the factory, then [`run`] it.
pub fn run_text(app: &Application, text: &str) -> ActionContextHandle {
    let action = app
        .factory()
        .create(text)
        .unwrap_or_else(|e| panic!("{}: {}", text, e));
    run(app, action)
}

pub fn wait(ctx: &ActionContextHandle) {
    assert!(ctx.wait_done_timeout(TIMEOUT), "action did not complete");
}

pub fn get(app: &Application, id: &str) -> Variant {
    app.state().primary().get(id).expect("variable exists")
}

pub fn assert_status(ctx: &ActionContextHandle, status: ActionStatus) {
    assert_eq!(
        ctx.status(),
        status,
        "unexpected status, errors: {}",
        ctx.error_message()
    );
}

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

static RECORD_PARAMS: &[ParamSpec] = &[ParamSpec::required("label", "Entry to append.")];

pub static RECORD_INFO: ActionInfo = ActionInfo {
    type_name: "record",
    description: "Append a label to a shared log.",
    params: RECORD_PARAMS,
    undoable: false,
    changes_project_data: false,
};

/// Appends its label to a shared log when run.
pub struct Record {
    pub label: String,
    pub log: Log,
}

impl Record {
    pub fn boxed(label: impl Into<String>, log: &Log) -> ActionHandle {
        Box::new(Record {
            label: label.into(),
            log: Arc::clone(log),
        })
    }
}

impl Action for Record {
    fn info(&self) -> &'static ActionInfo {
        &RECORD_INFO
    }

    fn param_values(&self) -> Vec<String> {
        vec![self.label.clone()]
    }

    fn validate(&mut self, _app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        true
    }

    fn run(
        &mut self,
        _app: &Arc<Application>,
        _ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        self.log.lock().unwrap().push(self.label.clone());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Validate,
    Run,
    Panic,
    Resource,
}

pub static FAIL_INFO: ActionInfo = ActionInfo {
    type_name: "fail",
    description: "Fails in a chosen step.",
    params: &[],
    undoable: false,
    changes_project_data: false,
};

pub struct Fail(pub FailAt);

impl Action for Fail {
    fn info(&self) -> &'static ActionInfo {
        &FAIL_INFO
    }

    fn param_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&mut self, _app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        match self.0 {
            FailAt::Validate => {
                ctx.report_error("precondition not met");
                false
            }
            FailAt::Resource => {
                ctx.report_need_resource(seg_core::notifier::Notifier::new("layer lock"));
                false
            }
            _ => true,
        }
    }

    fn run(
        &mut self,
        _app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        match self.0 {
            FailAt::Run => {
                ctx.report_error("run failed");
                false
            }
            FailAt::Panic => panic!("boom"),
            _ => true,
        }
    }
}

pub static TOUCH_INFO: ActionInfo = ActionInfo {
    type_name: "touch",
    description: "Changes project data without an undo checkpoint.",
    params: &[],
    undoable: false,
    changes_project_data: true,
};

/// A project-data change that cannot be undone: bumps `view::count`
/// directly.
pub struct Touch;

impl Action for Touch {
    fn info(&self) -> &'static ActionInfo {
        &TOUCH_INFO
    }

    fn param_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&mut self, app: &Arc<Application>, _ctx: &ActionContextHandle) -> bool {
        app.state().primary().contains("view::count")
    }

    fn run(
        &mut self,
        app: &Arc<Application>,
        ctx: &ActionContextHandle,
        _result: &mut Option<Variant>,
    ) -> bool {
        let store = app.state().primary();
        let next = store
            .get("view::count")
            .ok()
            .and_then(|v| v.as_int())
            .unwrap_or(0)
            + 1;
        store
            .set_from_variant("view::count", &Variant::Int(next), ctx.source())
            .is_ok()
    }
}

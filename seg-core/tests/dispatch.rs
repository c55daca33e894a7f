mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use seg_core::action::{
    Action, ActionContext, ActionContextHandle, ActionGet, ActionSet, ReportSink,
};
use seg_core::app::Application;
use seg_core::dispatch::DispatchError;
use seg_types::{ActionInfo, ActionSource, ActionStatus, Variant};

use common::*;

#[test]
fn per_thread_post_order_is_preserved() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 50;

    let app = start_app();
    let log = new_log();
    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let app = Arc::clone(&app);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                let mut last = None;
                for i in 0..PER_THREAD {
                    let ctx = script_ctx();
                    app.post(Record::boxed(format!("{}:{}", t, i), &log), &ctx);
                    last = Some(ctx);
                }
                last
            })
        })
        .collect();
    for producer in producers {
        let ctx = producer.join().unwrap().unwrap();
        wait(&ctx);
    }
    while app.dispatcher().is_busy() {
        thread::yield_now();
    }

    let seen = entries(&log);
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    for t in 0..THREADS {
        let order: Vec<usize> = seen
            .iter()
            .filter_map(|e| e.split_once(':'))
            .filter(|(thread, _)| thread.parse::<usize>().unwrap() == t)
            .map(|(_, i)| i.parse().unwrap())
            .collect();
        assert_eq!(order, (0..PER_THREAD).collect::<Vec<_>>());
    }
    assert!(app.dispatcher().last_completed().is_some());
    app.shutdown();
}

static OUTER_INFO: ActionInfo = ActionInfo {
    type_name: "outer",
    description: "Posts another action while running.",
    params: &[],
    undoable: false,
    changes_project_data: false,
};

struct Outer {
    log: Log,
    inner_ctx: Arc<Mutex<Option<ActionContextHandle>>>,
    nested_wait: Arc<Mutex<Option<Result<ActionStatus, DispatchError>>>>,
}

impl Action for Outer {
    fn info(&self) -> &'static ActionInfo {
        &OUTER_INFO
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
        self.log.lock().unwrap().push("outer-start".into());
        let inner = ActionContext::derived(ctx, ctx.source());
        app.post(Record::boxed("inner", &self.log), &inner);
        *self.inner_ctx.lock().unwrap() = Some(inner);

        let nested = ActionContext::new(ActionSource::None);
        *self.nested_wait.lock().unwrap() = Some(
            app.dispatcher()
                .post_and_wait(Record::boxed("never", &self.log), &nested),
        );
        self.log.lock().unwrap().push("outer-end".into());
        true
    }
}

#[test]
fn posting_from_an_action_runs_after_it() {
    let app = start_app();
    let log = new_log();
    let inner_ctx = Arc::new(Mutex::new(None));
    let nested_wait = Arc::new(Mutex::new(None));
    let ctx = run(
        &app,
        Box::new(Outer {
            log: Arc::clone(&log),
            inner_ctx: Arc::clone(&inner_ctx),
            nested_wait: Arc::clone(&nested_wait),
        }),
    );
    assert_status(&ctx, ActionStatus::Success);
    let inner = inner_ctx.lock().unwrap().clone().unwrap();
    wait(&inner);

    assert_eq!(entries(&log), vec!["outer-start", "outer-end", "inner"]);
    assert_eq!(
        nested_wait.lock().unwrap().clone(),
        Some(Err(DispatchError::WouldDeadlock))
    );
    app.shutdown();
}

#[test]
fn validation_failure_changes_nothing() {
    let app = start_app();
    register_view(&app);
    let ctx = run_text(&app, "set view::brightness 42");
    assert_status(&ctx, ActionStatus::Invalid);
    assert!(ctx.error_message().contains("outside"));
    assert_eq!(get(&app, "view::brightness"), Variant::Double(1.0));
    assert!(!app.undo_buffer().has_undo());
    assert!(app.provenance().is_empty());

    let ctx = run(&app, Box::new(Fail(FailAt::Validate)));
    assert_status(&ctx, ActionStatus::Invalid);
    app.shutdown();
}

#[test]
fn unknown_variable_is_invalid() {
    let app = start_app();
    let ctx = run_text(&app, "set view::missing 1");
    assert_status(&ctx, ActionStatus::Invalid);
    assert!(ctx.error_message().contains("unknown identifier"));
    app.shutdown();
}

#[test]
fn resource_wait_is_unavailable() {
    let app = start_app();
    let ctx = run(&app, Box::new(Fail(FailAt::Resource)));
    assert_status(&ctx, ActionStatus::Unavailable);
    assert_eq!(ctx.resource_notifier().unwrap().name(), "layer lock");
    app.shutdown();
}

#[test]
fn run_failure_and_panic_leave_dispatcher_running() {
    let app = start_app();
    register_view(&app);

    let ctx = run(&app, Box::new(Fail(FailAt::Run)));
    assert_status(&ctx, ActionStatus::Error);
    assert_eq!(ctx.error_message(), "run failed");

    let ctx = run(&app, Box::new(Fail(FailAt::Panic)));
    assert_status(&ctx, ActionStatus::Error);
    assert!(ctx.error_message().contains("panicked during run"));

    let ctx = run(&app, Box::new(ActionSet::new("view::label", "still alive")));
    assert_status(&ctx, ActionStatus::Success);
    assert_eq!(get(&app, "view::label"), Variant::Str("still alive".into()));
    app.shutdown();
}

#[test]
fn get_returns_value_as_result() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::count 7");
    let ctx = run(&app, Box::new(ActionGet::new("view::count")));
    assert_status(&ctx, ActionStatus::Success);
    assert_eq!(ctx.result(), Some(Variant::Int(7)));
    app.shutdown();
}

#[test]
fn batch_runs_back_to_back_with_one_completion() {
    let app = start_app();
    let log = new_log();
    let ctx = script_ctx();
    app.dispatcher().post_actions(
        vec![
            Record::boxed("a", &log),
            Box::new(Fail(FailAt::Validate)),
            Record::boxed("b", &log),
        ],
        &ctx,
    );
    wait(&ctx);
    assert_eq!(entries(&log), vec!["a", "b"]);
    assert_status(&ctx, ActionStatus::Invalid);
    assert_eq!(ctx.error_message(), "precondition not met");

    let empty = script_ctx();
    app.dispatcher().post_actions(Vec::new(), &empty);
    assert!(empty.is_done());
    app.shutdown();
}

/// Counts completions delivered to the sink.
#[derive(Default)]
struct CountDone(AtomicUsize);

impl ReportSink for CountDone {
    fn done(&self, _status: ActionStatus, _result: Option<&Variant>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn batch_reaches_sink_once() {
    let app = start_app();
    let log = new_log();
    let sink = Arc::new(CountDone::default());
    let ctx = ActionContext::with_sink(ActionSource::Script, sink.clone());
    app.dispatcher().post_actions(
        vec![
            Record::boxed("a", &log),
            Record::boxed("b", &log),
            Record::boxed("c", &log),
        ],
        &ctx,
    );
    wait(&ctx);
    assert_status(&ctx, ActionStatus::Success);
    assert_eq!(entries(&log), vec!["a", "b", "c"]);
    assert_eq!(sink.0.load(Ordering::SeqCst), 1);

    let single = ActionContext::with_sink(ActionSource::Script, sink.clone());
    app.post(Record::boxed("d", &log), &single);
    wait(&single);
    assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    app.shutdown();
}

#[test]
fn observers_see_every_successful_run() {
    let app = start_app();
    register_view(&app);
    let seen = new_log();
    {
        let seen = Arc::clone(&seen);
        app.dispatcher().on_pre_run(move |action, _ctx| {
            seen.lock().unwrap().push(format!("pre {}", action.type_name()));
        });
    }
    {
        let seen = Arc::clone(&seen);
        app.dispatcher().on_post_run(move |action, ctx| {
            seen.lock()
                .unwrap()
                .push(format!("post {} {:?}", action.type_name(), ctx.status()));
        });
    }
    run_text(&app, "set view::count 1");
    run_text(&app, "set view::count nope");
    // Post-run observers fire after completion is signalled.
    run_text(&app, "get view::count");
    while app.dispatcher().is_busy() {
        thread::yield_now();
    }
    let seen = entries(&seen);
    assert_eq!(seen[..3], ["pre set", "post set Success", "pre get"]);
    app.shutdown();
}

#[test]
fn posts_after_shutdown_fail() {
    let app = start_app();
    register_view(&app);
    app.shutdown();
    assert!(!app.dispatcher().is_running());

    let ctx = script_ctx();
    app.post(Box::new(ActionSet::new("view::count", 3)), &ctx);
    assert!(ctx.is_done());
    assert_status(&ctx, ActionStatus::Error);
    assert_eq!(get(&app, "view::count"), Variant::Int(0));
    assert_eq!(
        app.dispatcher()
            .post_and_wait(Box::new(ActionSet::new("view::count", 3)), &script_ctx()),
        Err(DispatchError::ShutDown)
    );
}

#[test]
fn shutdown_drains_queued_actions() {
    let app = start_app();
    let log = new_log();
    let ctxs: Vec<_> = (0..20)
        .map(|i| {
            let ctx = script_ctx();
            app.post(Record::boxed(i.to_string(), &log), &ctx);
            ctx
        })
        .collect();
    app.shutdown();
    assert!(ctxs.iter().all(|c| c.is_done()));
    assert_eq!(entries(&log).len(), 20);
}

#[test]
fn posts_racing_shutdown_always_complete() {
    for _ in 0..25 {
        let app = start_app();
        let log = new_log();
        let poster = {
            let app = Arc::clone(&app);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                (0..200)
                    .map(|i| {
                        let ctx = script_ctx();
                        app.post(Record::boxed(i.to_string(), &log), &ctx);
                        ctx
                    })
                    .collect::<Vec<_>>()
            })
        };
        thread::yield_now();
        app.shutdown();

        let ctxs = poster.join().unwrap();
        for ctx in &ctxs {
            wait(ctx);
        }
        let ran = ctxs.iter().filter(|c| c.is_success()).count();
        assert_eq!(entries(&log).len(), ran);
        assert!(ctxs[ran..].iter().all(|c| c.status() == ActionStatus::Error));
        assert_eq!(app.dispatcher().pending(), 0);
    }
}

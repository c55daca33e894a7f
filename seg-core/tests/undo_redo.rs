mod common;

use seg_core::action::{ActionOffset, ActionRedo, ActionSet, ActionUndo};
use seg_types::{ActionStatus, Variant};

use common::*;

#[test]
fn undo_reverts_only_the_undoable_action() {
    let app = start_app();
    register_view(&app);

    // A: undoable project change. B: change to a variable outside project data.
    assert_status(
        &run(&app, Box::new(ActionSet::new("view::brightness", 2.5))),
        ActionStatus::Success,
    );
    assert_status(
        &run(&app, Box::new(ActionSet::new("view::scratch", 9))),
        ActionStatus::Success,
    );
    assert_eq!(app.undo_buffer().num_undo_items(), 1);

    assert_status(&run(&app, Box::new(ActionUndo)), ActionStatus::Success);
    assert_eq!(get(&app, "view::brightness"), Variant::Double(1.0));
    assert_eq!(get(&app, "view::scratch"), Variant::Int(9));

    assert_status(&run(&app, Box::new(ActionRedo)), ActionStatus::Success);
    assert_eq!(get(&app, "view::brightness"), Variant::Double(2.5));
    app.shutdown();
}

#[test]
fn undo_redo_walks_history() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::label first");
    run_text(&app, "set view::label \"second value\"");
    run_text(&app, "set view::count 3");
    assert_eq!(
        app.undo_buffer().undo_tag(0).as_deref(),
        Some("Set view::count")
    );

    run_text(&app, "undo");
    run_text(&app, "undo");
    assert_eq!(get(&app, "view::label"), Variant::Str("first".into()));
    assert_eq!(get(&app, "view::count"), Variant::Int(0));
    assert_eq!(app.undo_buffer().num_undo_items(), 1);
    assert_eq!(app.undo_buffer().num_redo_items(), 2);
    assert_eq!(
        app.undo_buffer().redo_tag(0).as_deref(),
        Some("Set view::label")
    );

    run_text(&app, "redo");
    run_text(&app, "redo");
    assert_eq!(
        get(&app, "view::label"),
        Variant::Str("second value".into())
    );
    assert_eq!(get(&app, "view::count"), Variant::Int(3));
    assert!(!app.undo_buffer().has_redo());
    app.shutdown();
}

#[test]
fn empty_stacks_report_errors() {
    let app = start_app();
    let ctx = run_text(&app, "undo");
    assert_status(&ctx, ActionStatus::Error);
    assert_eq!(ctx.error_message(), "Undo list is empty");

    let ctx = run_text(&app, "redo");
    assert_status(&ctx, ActionStatus::Error);
    assert_eq!(ctx.error_message(), "Redo list is empty");
    app.shutdown();
}

#[test]
fn new_checkpoint_clears_redo() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::count 1");
    run_text(&app, "undo");
    assert!(app.undo_buffer().has_redo());
    run_text(&app, "set view::count 2");
    assert!(!app.undo_buffer().has_redo());
    app.shutdown();
}

#[test]
fn non_undoable_project_change_invalidates_redo() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::brightness 3");
    run_text(&app, "undo");
    assert!(app.undo_buffer().has_redo());

    assert_status(&run(&app, Box::new(Touch)), ActionStatus::Success);
    assert!(!app.undo_buffer().has_redo());
    assert_eq!(get(&app, "view::count"), Variant::Int(1));
    app.shutdown();
}

#[test]
fn unchanged_value_pushes_no_checkpoint() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::brightness 1");
    assert!(!app.undo_buffer().has_undo());
    app.shutdown();
}

#[test]
fn offset_is_undoable() {
    let app = start_app();
    register_view(&app);
    run(&app, Box::new(ActionOffset::new("view::brightness", 1.5)));
    assert_eq!(get(&app, "view::brightness"), Variant::Double(2.5));
    let ctx = run(&app, Box::new(ActionOffset::new("view::brightness", 100.0)));
    assert_status(&ctx, ActionStatus::Invalid);

    run_text(&app, "undo");
    assert_eq!(get(&app, "view::brightness"), Variant::Double(1.0));

    let ctx = run_text(&app, "offset view::label 1");
    assert_status(&ctx, ActionStatus::Invalid);
    app.shutdown();
}

#[test]
fn int_offset_is_exact_beyond_double_precision() {
    let app = start_app();
    register_view(&app);
    let big = (1i64 << 53) + 1;
    run(&app, Box::new(ActionSet::new("view::count", big)));
    let ctx = run(&app, Box::new(ActionOffset::new("view::count", 1.0)));
    assert_status(&ctx, ActionStatus::Success);
    assert_eq!(get(&app, "view::count"), Variant::Int(big + 1));
    run_text(&app, "undo");
    assert_eq!(get(&app, "view::count"), Variant::Int(big));

    run(&app, Box::new(ActionSet::new("view::count", i64::MAX)));
    let ctx = run(&app, Box::new(ActionOffset::new("view::count", 1.0)));
    assert_status(&ctx, ActionStatus::Invalid);
    assert_eq!(get(&app, "view::count"), Variant::Int(i64::MAX));

    run(&app, Box::new(ActionSet::new("view::count", 3)));
    let ctx = run(&app, Box::new(ActionOffset::new("view::count", 0.5)));
    assert_status(&ctx, ActionStatus::Invalid);
    app.shutdown();
}

#[test]
fn depth_comes_from_config() {
    let app = start_with("[undo]\nmax_depth = 2\n");
    register_view(&app);
    for n in 1..=3 {
        run_text(&app, &format!("set view::count {}", n));
    }
    assert_eq!(app.undo_buffer().num_undo_items(), 2);
    run_text(&app, "undo");
    run_text(&app, "undo");
    assert_eq!(get(&app, "view::count"), Variant::Int(1));
    assert_status(&run_text(&app, "undo"), ActionStatus::Error);
    app.shutdown();
}

#[test]
fn disabled_undo_records_nothing() {
    let app = start_with("[undo]\nenabled = false\n");
    register_view(&app);
    run_text(&app, "set view::count 5");
    assert!(!app.undo_buffer().has_undo());
    app.shutdown();
}

#[test]
fn clear_undo_buffer_forgets_everything() {
    let app = start_app();
    register_view(&app);
    run_text(&app, "set view::count 1");
    run_text(&app, "set view::count 2");
    run_text(&app, "undo");
    assert_status(&run_text(&app, "clearundobuffer"), ActionStatus::Success);
    assert!(!app.undo_buffer().has_undo());
    assert!(!app.undo_buffer().has_redo());
    app.shutdown();
}

#[test]
fn failed_undo_drops_the_checkpoint() {
    let app = start_app();
    let view = register_view(&app);
    run_text(&app, "set view::count 4");
    app.state().primary().set_locked("view::count", true).unwrap();

    let ctx = run_text(&app, "undo");
    assert_status(&ctx, ActionStatus::Error);
    assert!(ctx.error_message().contains("locked"));
    assert!(ctx
        .error_message()
        .contains("applying undo check point 'Set view::count'"));
    assert!(!app.undo_buffer().has_undo());
    assert!(!app.undo_buffer().has_redo());
    assert_eq!(view.get("count").unwrap(), Variant::Int(4));
    app.shutdown();
}

//! # seg-core
//!
//! Action dispatch and state core for the segmentation workbench. Every
//! change to application state is an action posted to a single dispatch
//! thread; state lives in typed, observable variables; undo, provenance and
//! background filters hang off the same pipeline.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seg_core::action::{ActionContext, ActionSet};
//! use seg_core::app::Application;
//! use seg_core::config::Config;
//! use seg_core::state::{StateHandler, StateVariable};
//! use seg_types::ActionSource;
//!
//! let app = Application::start(Config::load())?;
//! let view = StateHandler::new(app.state(), "view", false)?;
//! view.add(StateVariable::new("brightness", 1.0).with_range(0.0, 10.0).with_project_data(true))?;
//!
//! let ctx = ActionContext::new(ActionSource::Script);
//! app.dispatcher().post_and_wait(Box::new(ActionSet::new("view::brightness", 2.5)), &ctx)?;
//! app.dispatcher().post_and_wait(app.factory().create("undo")?, &ActionContext::new(ActionSource::Script))?;
//! app.shutdown();
//! ```
//!
//! ## Module Overview
//!
//! - [`app`]: the `Application` that owns the services below and the dispatch thread
//! - [`action`]: the `Action` trait, contexts, the factory and built-in actions
//! - [`dispatch`]: `ActionDispatcher` for posting, batches, blocking waits
//! - [`state`]: state variables, stores, sandboxes and handlers
//! - [`undo`]: undo/redo checkpoints built from inverse actions
//! - [`provenance`]: provenance ids and the recorded trail
//! - [`filter`]: background tasks and the concurrency gate
//! - [`config`]: TOML configuration (embedded defaults + user override)

pub mod action;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod filter;
pub mod notifier;
pub mod provenance;
pub mod state;
pub mod undo;

use std::any::Any;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
/// Actions run under `catch_unwind`, so a poisoned lock is not fatal.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

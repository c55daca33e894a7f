//! Undo/redo checkpoints built from inverse actions.
//!
//! Each undoable action pushes an [`UndoBufferItem`] holding the action that
//! reverts it and the action that re-applies it. Undo and redo replay those
//! actions through a derived context whose source is
//! [`ActionSource::UndoBuffer`], so the replay itself never pushes a new
//! checkpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use seg_types::ActionSource;

use crate::action::{Action, ActionContext, ActionContextHandle, ActionHandle};
use crate::app::Application;
use crate::lock;

pub struct UndoBufferItem {
    tag: String,
    undo: ActionHandle,
    redo: ActionHandle,
}

impl UndoBufferItem {
    pub fn new(
        tag: impl Into<String>,
        undo: impl Action + 'static,
        redo: impl Action + 'static,
    ) -> Self {
        Self::from_handles(tag, Box::new(undo), Box::new(redo))
    }

    pub fn from_handles(tag: impl Into<String>, undo: ActionHandle, redo: ActionHandle) -> Self {
        Self {
            tag: tag.into(),
            undo,
            redo,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

struct Stacks {
    undo: VecDeque<UndoBufferItem>,
    redo: VecDeque<UndoBufferItem>,
}

pub struct UndoBuffer {
    stacks: Mutex<Stacks>,
    max_depth: usize,
    enabled: AtomicBool,
}

impl UndoBuffer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stacks: Mutex::new(Stacks {
                undo: VecDeque::new(),
                redo: VecDeque::new(),
            }),
            max_depth: max_depth.max(1),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Disabling also drops every checkpoint.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.reset();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Push a checkpoint and clear the redo stack.
    ///
    /// Ignored while disabled and for replays coming from the buffer itself.
    /// The oldest checkpoint is dropped once `max_depth` is reached.
    pub fn insert(&self, ctx: &ActionContext, item: UndoBufferItem) -> bool {
        if !self.is_enabled() || ctx.source() == ActionSource::UndoBuffer {
            return false;
        }
        let mut stacks = lock(&self.stacks);
        stacks.redo.clear();
        if stacks.undo.len() >= self.max_depth {
            stacks.undo.pop_front();
        }
        log::debug!(target: "undo", "checkpoint '{}'", item.tag);
        stacks.undo.push_back(item);
        true
    }

    /// Revert the most recent checkpoint. On failure the checkpoint is lost
    /// and the error is reported through `ctx`.
    pub fn undo(&self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        let Some(mut item) = lock(&self.stacks).undo.pop_back() else {
            ctx.report_error("Undo list is empty");
            return false;
        };
        let replay = ActionContext::derived(ctx, ActionSource::UndoBuffer);
        if !replay_action(app, &replay, &mut item.undo) {
            ctx.report_error(format!(
                "Internal error encountered while applying undo check point '{}'",
                item.tag
            ));
            return false;
        }
        log::debug!(target: "undo", "undid '{}'", item.tag);
        lock(&self.stacks).redo.push_back(item);
        true
    }

    pub fn redo(&self, app: &Arc<Application>, ctx: &ActionContextHandle) -> bool {
        let Some(mut item) = lock(&self.stacks).redo.pop_back() else {
            ctx.report_error("Redo list is empty");
            return false;
        };
        let replay = ActionContext::derived(ctx, ActionSource::UndoBuffer);
        if !replay_action(app, &replay, &mut item.redo) {
            ctx.report_error(format!(
                "Internal error encountered while applying redo check point '{}'",
                item.tag
            ));
            return false;
        }
        log::debug!(target: "undo", "redid '{}'", item.tag);
        let mut stacks = lock(&self.stacks);
        if stacks.undo.len() >= self.max_depth {
            stacks.undo.pop_front();
        }
        stacks.undo.push_back(item);
        true
    }

    /// Forget pending redos, e.g. after a project change that cannot be
    /// undone.
    pub fn invalidate_redo(&self) {
        let mut stacks = lock(&self.stacks);
        if !stacks.redo.is_empty() {
            log::debug!(target: "undo", "dropping {} redo checkpoint(s)", stacks.redo.len());
            stacks.redo.clear();
        }
    }

    pub fn reset(&self) {
        let mut stacks = lock(&self.stacks);
        stacks.undo.clear();
        stacks.redo.clear();
    }

    pub fn has_undo(&self) -> bool {
        !lock(&self.stacks).undo.is_empty()
    }

    pub fn has_redo(&self) -> bool {
        !lock(&self.stacks).redo.is_empty()
    }

    pub fn num_undo_items(&self) -> usize {
        lock(&self.stacks).undo.len()
    }

    pub fn num_redo_items(&self) -> usize {
        lock(&self.stacks).redo.len()
    }

    /// Tag of the `index`-th undo checkpoint, 0 being the most recent.
    pub fn undo_tag(&self, index: usize) -> Option<String> {
        lock(&self.stacks)
            .undo
            .iter()
            .rev()
            .nth(index)
            .map(|item| item.tag.clone())
    }

    pub fn redo_tag(&self, index: usize) -> Option<String> {
        lock(&self.stacks)
            .redo
            .iter()
            .rev()
            .nth(index)
            .map(|item| item.tag.clone())
    }
}

fn replay_action(
    app: &Arc<Application>,
    ctx: &ActionContextHandle,
    action: &mut ActionHandle,
) -> bool {
    let ok = action.validate(app, ctx) && {
        let mut result = None;
        action.run(app, ctx, &mut result)
    };
    action.clear_cache();
    ok
}

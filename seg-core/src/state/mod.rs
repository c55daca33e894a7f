//! Typed, observable state.
//!
//! A [`StateVariable`] lives in exactly one [`StateStore`]. The
//! [`StateRegistry`] owns the primary store and any number of sandboxes, and
//! [`StateHandler`] namespaces a group of variables under one handler id.

pub mod handler;
pub mod registry;
pub mod store;
pub mod variable;

use std::sync::OnceLock;

use regex::Regex;
use seg_types::{SandboxId, ValueError};
use thiserror::Error;

pub use handler::StateHandler;
pub use registry::StateRegistry;
pub use store::{StateHandle, StateStore};
pub use variable::{
    ChangeObserver, Constraint, OptionEntry, StateChange, StateVariable, SubscriptionId,
    DEFAULT_LOAD, DO_NOT_LOAD,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("identifier '{0}' is already registered")]
    DuplicateIdentifier(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("'{id}': {source}")]
    Conversion { id: String, source: ValueError },
    #[error("'{id}': {value} is outside [{min}, {max}]")]
    OutOfRange {
        id: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("'{id}': '{value}' is not one of [{options}]")]
    InvalidOption {
        id: String,
        value: String,
        options: String,
    },
    #[error("'{0}': not a number")]
    NotANumber(String),
    #[error("'{id}': '{entry}' is not a value=label pair")]
    InvalidOptionList { id: String, entry: String },
    #[error("'{0}' is locked")]
    Locked(String),
    #[error("stale state handle")]
    StaleHandle,
    #[error("unknown identifier: sandbox {0} does not exist")]
    UnknownSandbox(SandboxId),
    #[error("sandbox {0} already exists")]
    DuplicateSandbox(SandboxId),
    #[error("invalid sandbox id {0}")]
    InvalidSandbox(SandboxId),
}

/// `name` or `handler::name`, lower-case words joined by `::`.
pub fn is_valid_state_id(id: &str) -> bool {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    ID_RE
        .get_or_init(|| Regex::new(r"^[a-z0-9_]+(::[a-z0-9_]+)*$").expect("valid id pattern"))
        .is_match(id)
}

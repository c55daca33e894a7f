//! # seg-types
//!
//! Shared type definitions for the segmentation core.
//! This crate holds the plain data that crosses the boundary between the
//! dispatch core and its consumers (console, scripting bridge, persistence):
//! tagged values and their canonical strings, action metadata, and the
//! textual command grammar.

pub mod action;
pub mod command;
pub mod variant;

pub use action::{ActionInfo, ActionSource, ActionStatus, BoundParams, ParamSpec};
pub use command::{ActionCommand, CommandParseError};
pub use variant::{ValueError, ValueKind, Variant};

/// Identifies a state store. `-1` always addresses the primary store;
/// sandboxes use ids `>= 0`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SandboxId(i32);

impl SandboxId {
    /// The primary store ("no sandbox").
    pub const PRIMARY: SandboxId = SandboxId(-1);

    pub fn new(id: i32) -> Self {
        Self(id)
    }
    pub fn get(self) -> i32 {
        self.0
    }
    pub fn is_primary(self) -> bool {
        self.0 == -1
    }
    /// Ids below -1 never address anything.
    pub fn is_valid_sandbox(self) -> bool {
        self.0 >= 0
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SandboxId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i32>().map(SandboxId)
    }
}

/// Process-unique label attached to every state-producing action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ProvenanceId(u64);

impl ProvenanceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProvenanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Action metadata shared by the dispatcher, the scripting bridge and the
//! provenance recorder.

use serde::{Deserialize, Serialize};

use crate::command::{ActionCommand, CommandParseError};

/// Where a dispatched action came from.
///
/// Actions may behave differently for a human than for a script (no
/// interactive confirmation), and replays from the undo buffer or the
/// provenance log must not be recorded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSource {
    None,
    Interface,
    Script,
    CommandLine,
    Network,
    Provenance,
    UndoBuffer,
}

impl ActionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSource::None => "none",
            ActionSource::Interface => "interface",
            ActionSource::Script => "script",
            ActionSource::CommandLine => "commandline",
            ActionSource::Network => "network",
            ActionSource::Provenance => "provenance",
            ActionSource::UndoBuffer => "undobuffer",
        }
    }

    /// Replays are not recorded into history or provenance again.
    pub fn is_replay(&self) -> bool {
        matches!(self, ActionSource::Provenance | ActionSource::UndoBuffer)
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    Success,
    Error,
    /// Preconditions were not met.
    Invalid,
    /// A needed resource is locked or missing; the caller may retry later.
    Unavailable,
}

/// One declared action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// `None` marks a required positional argument.
    pub default: Option<&'static str>,
    /// Excluded from saved sessions and provenance records.
    pub non_persistent: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            default: None,
            non_persistent: false,
            description,
        }
    }

    pub const fn key(name: &'static str, default: &'static str, description: &'static str) -> Self {
        Self {
            name,
            default: Some(default),
            non_persistent: false,
            description,
        }
    }

    pub const fn non_persistent(mut self) -> Self {
        self.non_persistent = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Self-description of an action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionInfo {
    pub type_name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub undoable: bool,
    pub changes_project_data: bool,
}

impl ActionInfo {
    pub fn arguments(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.is_required())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| !p.is_required())
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// `type ARG1 ARG2 [key=default]`
    pub fn usage(&self) -> String {
        let mut usage = self.type_name.to_string();
        for arg in self.arguments() {
            usage.push(' ');
            usage.push_str(&arg.name.to_uppercase());
        }
        for key in self.keys() {
            usage.push_str(&format!(" [{}={}]", key.name, key.default.unwrap_or_default()));
        }
        usage
    }

    /// Match a parsed command against the declaration, filling defaults.
    ///
    /// Required parameters may be given positionally or as `name=value`.
    pub fn bind(&self, cmd: &ActionCommand) -> Result<BoundParams, CommandParseError> {
        if !cmd.action_type.eq_ignore_ascii_case(self.type_name) {
            return Err(CommandParseError::UnknownType(cmd.action_type.clone()));
        }
        for (key, _) in &cmd.keys {
            if self.param(key).is_none() {
                return Err(CommandParseError::UnknownKey {
                    action: self.type_name.to_string(),
                    key: key.clone(),
                });
            }
        }

        // Required parameters given as keys take no positional slot.
        let required = self
            .arguments()
            .filter(|spec| cmd.key(spec.name).is_none())
            .count();
        if cmd.args.len() > required {
            return Err(CommandParseError::ArgumentCount {
                action: self.type_name.to_string(),
                expected: required,
                got: cmd.args.len(),
                usage: self.usage(),
            });
        }

        let mut positional = cmd.args.iter();
        let mut values = Vec::with_capacity(self.params.len());
        for spec in self.params {
            let value = if spec.is_required() {
                match cmd.key(spec.name).or_else(|| positional.next().map(String::as_str)) {
                    Some(v) => v.to_string(),
                    None => {
                        return Err(CommandParseError::MissingParameter {
                            action: self.type_name.to_string(),
                            name: spec.name.to_string(),
                        })
                    }
                }
            } else {
                cmd.key(spec.name)
                    .or(spec.default)
                    .unwrap_or_default()
                    .to_string()
            };
            values.push((spec.name, value));
        }
        Ok(BoundParams { values })
    }

    /// Render parameter values (in declaration order) back to a command.
    pub fn to_command(&self, values: &[String], persistent_only: bool) -> ActionCommand {
        let mut cmd = ActionCommand::new(self.type_name);
        for (spec, value) in self.params.iter().zip(values) {
            if persistent_only && spec.non_persistent {
                continue;
            }
            if spec.is_required() {
                cmd.args.push(value.clone());
            } else {
                cmd.keys.push((spec.name.to_string(), value.clone()));
            }
        }
        cmd
    }
}

/// Parameter values after binding, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParams {
    values: Vec<(&'static str, String)>,
}

impl BoundParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }
}

use std::collections::BTreeMap;
use std::sync::RwLock;

use seg_types::{ActionCommand, ActionInfo, BoundParams, CommandParseError};
use thiserror::Error;

use super::{history, sandbox, state, ActionHandle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactoryError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("action type '{0}' is already registered")]
    Duplicate(String),
    #[error("{action}: invalid value '{value}' for '{param}'")]
    InvalidParameter {
        action: &'static str,
        param: &'static str,
        value: String,
    },
}

impl FactoryError {
    pub(crate) fn invalid(info: &'static ActionInfo, param: &'static str, value: &str) -> Self {
        FactoryError::InvalidParameter {
            action: info.type_name,
            param,
            value: value.to_string(),
        }
    }
}

type Builder = Box<dyn Fn(&BoundParams) -> Result<ActionHandle, FactoryError> + Send + Sync>;

struct Entry {
    info: &'static ActionInfo,
    build: Builder,
}

/// Creates actions from their textual form (`set layer0::opacity 0.5`).
pub struct ActionFactory {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl ActionFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// A factory that knows every built-in action.
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        let builtins: [(&'static ActionInfo, fn(&BoundParams) -> Result<ActionHandle, FactoryError>); 8] = [
            (&state::SET_INFO, state::ActionSet::from_params),
            (&state::GET_INFO, state::ActionGet::from_params),
            (&state::OFFSET_INFO, state::ActionOffset::from_params),
            (&history::UNDO_INFO, history::ActionUndo::from_params),
            (&history::REDO_INFO, history::ActionRedo::from_params),
            (&history::CLEAR_UNDO_INFO, history::ActionClearUndoBuffer::from_params),
            (&sandbox::CREATE_INFO, sandbox::ActionCreateSandbox::from_params),
            (&sandbox::DELETE_INFO, sandbox::ActionDeleteSandbox::from_params),
        ];
        for (info, build) in builtins {
            if let Err(e) = factory.register(info, build) {
                log::error!(target: "dispatch", "{}", e);
            }
        }
        factory
    }

    pub fn register(
        &self,
        info: &'static ActionInfo,
        build: impl Fn(&BoundParams) -> Result<ActionHandle, FactoryError> + Send + Sync + 'static,
    ) -> Result<(), FactoryError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let key = info.type_name.to_lowercase();
        if entries.contains_key(&key) {
            return Err(FactoryError::Duplicate(key));
        }
        entries.insert(
            key,
            Entry {
                info,
                build: Box::new(build),
            },
        );
        Ok(())
    }

    pub fn create(&self, text: &str) -> Result<ActionHandle, FactoryError> {
        let cmd = ActionCommand::parse(text)?;
        self.create_from_command(&cmd)
    }

    pub fn create_from_command(&self, cmd: &ActionCommand) -> Result<ActionHandle, FactoryError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get(&cmd.action_type.to_lowercase())
            .ok_or_else(|| CommandParseError::UnknownType(cmd.action_type.clone()))?;
        let params = entry.info.bind(cmd)?;
        (entry.build)(&params)
    }

    pub fn info(&self, type_name: &str) -> Option<&'static ActionInfo> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_name.to_lowercase())
            .map(|e| e.info)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn usage(&self, type_name: &str) -> Option<String> {
        self.info(type_name).map(ActionInfo::usage)
    }
}

impl Default for ActionFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let factory = ActionFactory::with_builtins();
        for t in [
            "set",
            "get",
            "offset",
            "undo",
            "redo",
            "clearundobuffer",
            "createsandbox",
            "deletesandbox",
        ] {
            assert!(factory.info(t).is_some(), "{} missing", t);
        }
        assert_eq!(
            factory.usage("set").unwrap(),
            "set STATEID VALUE [sandbox=-1]"
        );
    }

    #[test]
    fn create_round_trips_through_export() {
        let factory = ActionFactory::with_builtins();
        let action = factory.create("SET layer0::opacity 0.5 sandbox=2").unwrap();
        assert_eq!(action.type_name(), "set");
        assert_eq!(
            action.export_to_string(),
            "set layer0::opacity 0.5 sandbox=2"
        );
        let again = factory.create(&action.export_to_string()).unwrap();
        assert_eq!(again.export_to_string(), action.export_to_string());
    }

    #[test]
    fn create_reports_errors() {
        let factory = ActionFactory::with_builtins();
        assert!(matches!(
            factory.create("explode now"),
            Err(FactoryError::Parse(CommandParseError::UnknownType(_)))
        ));
        assert!(matches!(
            factory.create("set onlyone"),
            Err(FactoryError::Parse(CommandParseError::MissingParameter { .. }))
        ));
        assert!(matches!(
            factory.create("set a::b 1 sandbox=left"),
            Err(FactoryError::InvalidParameter { param: "sandbox", .. })
        ));
        assert!(matches!(
            factory.create("offset a::b lots"),
            Err(FactoryError::InvalidParameter { param: "offset", .. })
        ));
    }

    #[test]
    fn duplicate_registration_fails() {
        let factory = ActionFactory::with_builtins();
        assert_eq!(
            factory.register(&state::SET_INFO, state::ActionSet::from_params),
            Err(FactoryError::Duplicate("set".into()))
        );
    }
}

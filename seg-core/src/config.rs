use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    undo: UndoConfig,
    #[serde(default)]
    filters: FilterConfig,
    #[serde(default)]
    dispatcher: DispatcherConfig,
    #[serde(default)]
    provenance: ProvenanceConfig,
}

#[derive(Deserialize, Default, Clone)]
struct UndoConfig {
    enabled: Option<bool>,
    max_depth: Option<usize>,
}

#[derive(Deserialize, Default, Clone)]
struct FilterConfig {
    max_concurrent: Option<usize>,
}

#[derive(Deserialize, Default, Clone)]
struct DispatcherConfig {
    queue_warn_threshold: Option<usize>,
}

#[derive(Deserialize, Default, Clone)]
struct ProvenanceConfig {
    enabled: Option<bool>,
    user: Option<String>,
}

/// Runtime settings: embedded defaults with an optional user override.
#[derive(Clone)]
pub struct Config {
    undo: UndoConfig,
    filters: FilterConfig,
    dispatcher: DispatcherConfig,
    provenance: ProvenanceConfig,
}

impl Config {
    /// Embedded defaults merged with `<config_dir>/seg3d/config.toml`.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Embedded defaults merged with the file at `path`, if it exists.
    ///
    /// An unreadable or malformed file is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::default();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.merge(user),
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    /// Embedded defaults overridden by the keys present in `text`.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(text)?;
        let mut config = Self::default();
        config.merge(user);
        Ok(config)
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_undo(&mut self.undo, user.undo);
        merge_filters(&mut self.filters, user.filters);
        merge_dispatcher(&mut self.dispatcher, user.dispatcher);
        merge_provenance(&mut self.provenance, user.provenance);
    }

    pub fn undo_enabled(&self) -> bool {
        self.undo.enabled.unwrap_or(true)
    }

    /// Undo stack depth (clamped to 1..10000).
    pub fn undo_max_depth(&self) -> usize {
        self.undo.max_depth.unwrap_or(100).clamp(1, 10_000)
    }

    /// Concurrently computing background filters (clamped to 1..256).
    pub fn max_concurrent_filters(&self) -> usize {
        self.filters.max_concurrent.unwrap_or(4).clamp(1, 256)
    }

    /// Queue length above which the dispatcher logs a warning on post.
    pub fn queue_warn_threshold(&self) -> usize {
        self.dispatcher.queue_warn_threshold.unwrap_or(1000)
    }

    pub fn provenance_enabled(&self) -> bool {
        self.provenance.enabled.unwrap_or(true)
    }

    /// User name stamped on provenance records; falls back to `$USER`.
    pub fn provenance_user(&self) -> String {
        match self.provenance.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => std::env::var("USER")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is malformed: {}", e);
                ConfigFile::default()
            }
        };
        Config {
            undo: base.undo,
            filters: base.filters,
            dispatcher: base.dispatcher,
            provenance: base.provenance,
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("seg3d").join("config.toml"))
}

fn merge_undo(base: &mut UndoConfig, user: UndoConfig) {
    if user.enabled.is_some() {
        base.enabled = user.enabled;
    }
    if user.max_depth.is_some() {
        base.max_depth = user.max_depth;
    }
}

fn merge_filters(base: &mut FilterConfig, user: FilterConfig) {
    if user.max_concurrent.is_some() {
        base.max_concurrent = user.max_concurrent;
    }
}

fn merge_dispatcher(base: &mut DispatcherConfig, user: DispatcherConfig) {
    if user.queue_warn_threshold.is_some() {
        base.queue_warn_threshold = user.queue_warn_threshold;
    }
}

fn merge_provenance(base: &mut ProvenanceConfig, user: ProvenanceConfig) {
    if user.enabled.is_some() {
        base.enabled = user.enabled;
    }
    if user.user.is_some() {
        base.user = user.user;
    }
}

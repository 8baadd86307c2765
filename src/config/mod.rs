//! Configuration management for MIDI Router
//!
//! Handles loading, environment expansion, preset resolution, validation
//! and hot-reloading of the YAML configuration file.

pub mod watcher;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

use crate::actions::ActionRegistry;
use crate::params::{ParamValue, Params, PRESETS_KEY};
use crate::router::GLOBAL_DEVICE;
use crate::rules::{MatchRule, ValueRange};

pub use watcher::ConfigWatcher;

/// Device name -> ordered mapping entries
pub type Mappings = HashMap<String, Vec<MappingEntry>>;

/// Startup-fatal configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown preset '{name}' referenced by mapping {device}[{index}]")]
    UnknownPreset {
        device: String,
        index: usize,
        name: String,
    },
    #[error("invalid mapping {device}[{index}]: {message}")]
    InvalidMapping {
        device: String,
        index: usize,
        message: String,
    },
    #[error("device name '{0}' is reserved")]
    ReservedDeviceName(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_assistant: Option<HomeAssistantConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub presets: BTreeMap<String, Vec<ParamValue>>,
    #[serde(default)]
    pub mappings: Mappings,
}

/// Home Assistant connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomeAssistantConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

/// Dispatch tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: default_action_timeout_ms(),
            queue_size: default_queue_size(),
        }
    }
}

impl RouterConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// MIDI input device selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Friendly name, used as the mapping key
    pub name: String,
    /// Case-insensitive port name substring, `*` matches every port
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One rule -> action binding
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MappingEntry {
    #[serde(rename = "match")]
    pub match_rule: MatchRule,
    pub action: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    #[serde(default)]
    pub cycle: bool,
}

impl MappingEntry {
    pub fn new(match_rule: MatchRule, action: impl Into<String>) -> Self {
        Self {
            match_rule,
            action: action.into(),
            params: Params::new(),
            cycle: false,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Preset list, when `presets` is present and a list
    pub fn presets(&self) -> Option<&[ParamValue]> {
        self.params.get(PRESETS_KEY).and_then(ParamValue::as_list)
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse, expand `${VAR}`, resolve `$preset` references and validate
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut raw: Value = serde_yaml::from_str(contents)?;
        if raw.is_null() {
            raw = Value::Mapping(Default::default());
        }

        expand_env_vars_recursive(&mut raw);

        let mut config: AppConfig = serde_yaml::from_value(raw)?;
        config.resolve_preset_references()?;
        config.validate()?;
        Ok(config)
    }

    /// Replace string params of the form `$name` with the named preset list
    fn resolve_preset_references(&mut self) -> Result<(), ConfigError> {
        let presets = &self.presets;
        for (device, entries) in self.mappings.iter_mut() {
            for (index, entry) in entries.iter_mut().enumerate() {
                for value in entry.params.values_mut() {
                    let name = match value.as_str().and_then(|s| s.strip_prefix('$')) {
                        Some(name) => name.to_string(),
                        None => continue,
                    };
                    let preset = presets.get(&name).ok_or_else(|| ConfigError::UnknownPreset {
                        device: device.clone(),
                        index,
                        name: name.clone(),
                    })?;
                    *value = ParamValue::List(preset.clone());
                }
            }
        }
        Ok(())
    }

    /// Shape checks that must hold before the router is built
    ///
    /// Hard errors fail startup; suspicious but usable settings only warn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for device in &self.devices {
            if device.name == GLOBAL_DEVICE {
                return Err(ConfigError::ReservedDeviceName(device.name.clone()));
            }
        }

        for (device, entries) in &self.mappings {
            if device != GLOBAL_DEVICE && !self.devices.iter().any(|d| &d.name == device) {
                warn!("Mappings for '{}' do not match any configured device", device);
            }

            for (index, entry) in entries.iter().enumerate() {
                let invalid = |message: String| ConfigError::InvalidMapping {
                    device: device.clone(),
                    index,
                    message,
                };

                validate_rule(&entry.match_rule).map_err(invalid)?;

                match entry.params.get(PRESETS_KEY) {
                    Some(ParamValue::List(list)) if list.is_empty() && entry.cycle => {
                        warn!("Mapping {}[{}] cycles over an empty preset list", device, index);
                    }
                    Some(ParamValue::List(_)) => {}
                    Some(other) => {
                        return Err(invalid(format!(
                            "'{}' must be a list, got {}",
                            PRESETS_KEY,
                            other.kind()
                        )));
                    }
                    None if entry.cycle => {
                        warn!("Mapping {}[{}] has cycle: true but no presets", device, index);
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Action names used by mappings that `registry` does not know
    pub fn unknown_actions(&self, registry: &ActionRegistry) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .mappings
            .values()
            .flatten()
            .filter(|entry| !registry.contains(&entry.action))
            .map(|entry| entry.action.clone())
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }

    /// Total number of mapping entries
    pub fn mapping_count(&self) -> usize {
        self.mappings.values().map(Vec::len).sum()
    }
}

fn validate_rule(rule: &MatchRule) -> Result<(), String> {
    if let Some(channel) = rule.channel {
        if channel > 15 {
            return Err(format!("channel {} out of range 0-15", channel));
        }
    }

    let data_fields = [
        ("control", rule.control),
        ("note", rule.note),
        ("program", rule.program),
    ];
    for (field, value) in data_fields {
        if let Some(v) = value {
            if v > 127 {
                return Err(format!("{} {} out of range 0-127", field, v));
            }
        }
    }

    for (field, range) in [("value", rule.value), ("velocity", rule.velocity)] {
        if let Some(ValueRange { min, max }) = range {
            for bound in [min, max].into_iter().flatten() {
                if bound > 127 {
                    return Err(format!("{} bound {} out of range 0-127", field, bound));
                }
            }
        }
    }
    Ok(())
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"))
}

/// Expand `${VAR}` from the environment; unset variables become empty
pub fn expand_env_vars(value: &str) -> String {
    env_var_pattern()
        .replace_all(value, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn expand_env_vars_recursive(value: &mut Value) {
    match value {
        Value::String(s) => *s = expand_env_vars(s),
        Value::Sequence(items) => items.iter_mut().for_each(expand_env_vars_recursive),
        Value::Mapping(map) => map.iter_mut().for_each(|(_, v)| expand_env_vars_recursive(v)),
        Value::Tagged(tagged) => expand_env_vars_recursive(&mut tagged.value),
        _ => {}
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_action_timeout_ms() -> u64 { 30_000 }
fn default_queue_size() -> usize { 1000 }

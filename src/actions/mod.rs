//! Actions triggered by matched MIDI events
//!
//! Actions are registered explicitly into an [`ActionRegistry`] before the
//! event loop starts; the registry is immutable afterwards.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::homeassistant::HaClient;
use crate::midi::MidiEvent;
use crate::params::{ParamValue, Params};

pub mod console;
pub mod homeassistant;
pub mod shell;

pub use console::PrintMessage;
pub use homeassistant::{HaBrightness, HaColor, HaColorTemp, HaToggle};
pub use shell::Shell;

/// Per-invocation context handed to an action
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Home Assistant client, if configured
    pub ha: Option<Arc<HaClient>>,
    /// Event that triggered the action
    pub event: MidiEvent,
    /// Friendly name of the device that sent the event
    pub device_name: String,
    /// Current preset index when cycling
    pub cycle_index: Option<usize>,
    /// Current preset value when cycling
    pub preset_value: Option<ParamValue>,
}

impl ActionContext {
    pub fn new(device_name: impl Into<String>, event: MidiEvent) -> Self {
        Self {
            ha: None,
            event,
            device_name: device_name.into(),
            cycle_index: None,
            preset_value: None,
        }
    }

    /// Home Assistant client or an error naming the missing configuration
    pub fn ha(&self) -> Result<&HaClient> {
        self.ha
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Home Assistant not configured"))
    }
}

/// Action trait - every built-in or user action implements this
///
/// Actions are shared behind `Arc<dyn Action>` and may be invoked
/// concurrently; use interior mutability for any state.
#[async_trait]
pub trait Action: Send + Sync {
    /// Name used by mappings to refer to this action
    fn name(&self) -> &str;

    /// One-line description for `list-actions`
    fn description(&self) -> &str {
        "No description"
    }

    /// Run the action. Errors are reported by the router and never stop
    /// event processing.
    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()>;
}

type ActionFn = dyn Fn(ActionContext, Params) -> Result<()> + Send + Sync;

/// Adapter turning a plain closure into an [`Action`]
pub struct FnAction {
    name: String,
    description: String,
    func: Box<ActionFn>,
}

impl FnAction {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(ActionContext, Params) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        (self.func)(ctx, params)
    }
}

/// Immutable name -> action table
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    /// Registry containing only the built-in actions
    pub fn with_builtins() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Look up an action by exact name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Action>)> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Collects actions before the registry is frozen
#[derive(Default)]
pub struct ActionRegistryBuilder {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistryBuilder {
    /// Register under the action's own name; a later registration wins
    pub fn register<A: Action + 'static>(self, action: A) -> Self {
        let name = action.name().to_string();
        self.register_as(name, Arc::new(action))
    }

    /// Register under an explicit name
    pub fn register_as(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        let name = name.into();
        debug!("Registering action '{}'", name);
        if self.actions.insert(name.clone(), action).is_some() {
            warn!("Action '{}' registered twice, keeping the latest", name);
        }
        self
    }

    /// Register a closure
    pub fn register_fn<F>(self, name: &str, description: &str, func: F) -> Self
    where
        F: Fn(ActionContext, Params) -> Result<()> + Send + Sync + 'static,
    {
        self.register(FnAction::new(name, description, func))
    }

    /// Add the built-in Home Assistant, shell and console actions
    pub fn with_builtins(self) -> Self {
        self.register(HaToggle)
            .register(HaBrightness)
            .register(HaColor)
            .register(HaColorTemp)
            .register(Shell::default())
            .register(PrintMessage::new())
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            actions: self.actions,
        }
    }
}

/// Built-in action names
pub const BUILTIN_ACTIONS: &[&str] = &[
    "ha_brightness",
    "ha_color",
    "ha_color_temp",
    "ha_toggle",
    "print_message",
    "shell",
];

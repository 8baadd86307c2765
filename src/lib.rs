//! MIDI Router
//!
//! Routes events from MIDI control surfaces to named actions (Home
//! Assistant service calls, shell commands, log messages) using declarative
//! match rules, with optional per-control preset cycling.

pub mod actions;
pub mod config;
pub mod cycle;
pub mod devices;
pub mod homeassistant;
pub mod midi;
pub mod monitor;
pub mod params;
pub mod router;
pub mod rules;

pub use actions::{Action, ActionContext, ActionRegistry};
pub use config::{AppConfig, MappingEntry, Mappings};
pub use cycle::{CycleKey, CycleTracker};
pub use midi::{EventKind, MidiEvent};
pub use params::{ParamValue, Params};
pub use router::{Dispatcher, Router};
pub use rules::{MatchRule, ValueRange};

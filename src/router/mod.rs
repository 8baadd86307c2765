//! Router module - routes device events to mapped actions
//!
//! The Router owns:
//! - The device -> mapping table, plus the reserved "global" list
//! - The action registry
//! - Preset cycle state, shared across every device
//!
//! Events reach [`Router::handle`] through a single [`Dispatcher`] so cycle
//! state sees one ordered stream.

mod dispatch;
mod dispatcher;

pub use dispatch::{DispatchError, DispatchSummary};
pub use dispatcher::{Dispatcher, EventSender};


use crate::actions::ActionRegistry;
use crate::config::Mappings;
use crate::cycle::CycleTracker;
use crate::homeassistant::HaClient;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pseudo-device whose mappings apply to every device
pub const GLOBAL_DEVICE: &str = "global";

/// Default bound on a single action invocation
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Rule-matching dispatcher from (device, event) to actions
pub struct Router {
    /// Mapping table, swapped wholesale on config reload
    pub(crate) mappings: RwLock<Arc<Mappings>>,
    /// Registered actions by name
    pub(crate) registry: Arc<ActionRegistry>,
    /// Preset cycling state
    pub(crate) cycles: Mutex<CycleTracker>,
    /// Home Assistant client handed to every action
    pub(crate) ha: Option<Arc<HaClient>>,
    /// Time limit for one action invocation
    pub(crate) action_timeout: Duration,
}

impl Router {
    /// Create a new Router with a fresh cycle state
    pub fn new(mappings: Mappings, registry: ActionRegistry, ha: Option<HaClient>) -> Self {
        Self {
            mappings: RwLock::new(Arc::new(mappings)),
            registry: Arc::new(registry),
            cycles: Mutex::new(CycleTracker::new()),
            ha: ha.map(Arc::new),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Snapshot of the current mapping table
    pub fn mappings(&self) -> Arc<Mappings> {
        self.mappings.read().clone()
    }

    /// Replace the mapping table (hot reload)
    ///
    /// Cycle positions are kept; keys whose rules disappeared are simply
    /// never consulted again.
    pub fn update_mappings(&self, mappings: Mappings) {
        let total: usize = mappings.values().map(Vec::len).sum();
        *self.mappings.write() = Arc::new(mappings);
        info!("Mappings updated ({} entries)", total);
    }

    /// Drop all cycle positions
    pub fn reset_cycles(&self) {
        self.cycles.lock().clear();
    }
}

//! Per-event rule evaluation and action invocation

use std::time::Duration;
use thiserror::Error;
use tracing::{info, trace, warn};

use super::{Router, GLOBAL_DEVICE};
use crate::actions::ActionContext;
use crate::config::MappingEntry;
use crate::cycle::CycleKey;
use crate::midi::MidiEvent;
use crate::params::{ParamValue, PRESETS_KEY};

/// Why a matched mapping did not complete
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Error in action '{action}': {error:#}")]
    Failed { action: String, error: anyhow::Error },
    #[error("Action '{action}' timed out after {timeout:?}")]
    Timeout { action: String, timeout: Duration },
    #[error("Action '{action}' panicked")]
    Panicked { action: String },
    #[error("Action '{action}' was cancelled")]
    Cancelled { action: String },
}

/// Outcome counts for one handled event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Mapping entries whose rule matched
    pub matched: usize,
    /// Matched entries whose action ran to completion
    pub succeeded: usize,
}

impl DispatchSummary {
    pub fn failed(&self) -> usize {
        self.matched - self.succeeded
    }
}

impl Router {
    /// Route one event to every matching mapping
    ///
    /// Device-specific mappings are evaluated first, then the global list.
    /// Every match fires. Failures are logged and never stop the remaining
    /// mappings or later events.
    pub async fn handle(&self, device_name: &str, event: &MidiEvent) -> DispatchSummary {
        info!("[{}] {}", device_name, event);

        let mappings = self.mappings();
        let device_entries = mappings.get(device_name).map(Vec::as_slice).unwrap_or_default();
        let global_entries = mappings.get(GLOBAL_DEVICE).map(Vec::as_slice).unwrap_or_default();

        let mut summary = DispatchSummary::default();
        for entry in device_entries.iter().chain(global_entries) {
            if !entry.match_rule.matches(event) {
                trace!("Rule {} skipped", entry.match_rule.signature());
                continue;
            }

            summary.matched += 1;
            match self.dispatch(device_name, event, entry).await {
                Ok(()) => summary.succeeded += 1,
                Err(e @ DispatchError::UnknownAction(_)) => warn!("  -> Warning: {}", e),
                Err(e) => warn!("  -> {}", e),
            }
        }
        summary
    }

    /// Run the action bound to one matched mapping
    async fn dispatch(
        &self,
        device_name: &str,
        event: &MidiEvent,
        entry: &MappingEntry,
    ) -> Result<(), DispatchError> {
        let (cycle_index, preset_value) = self.select_preset(device_name, entry);

        let ctx = ActionContext {
            ha: self.ha.clone(),
            event: event.clone(),
            device_name: device_name.to_string(),
            cycle_index,
            preset_value,
        };

        let action = self
            .registry
            .get(&entry.action)
            .ok_or_else(|| DispatchError::UnknownAction(entry.action.clone()))?;

        let params = entry.params.without(PRESETS_KEY);
        match cycle_index {
            Some(index) => info!("  -> {} ({}) [preset {}]", entry.action, params, index),
            None => info!("  -> {} ({})", entry.action, params),
        }

        // Own task so a panic surfaces as a JoinError
        let mut task = tokio::spawn(async move { action.invoke(ctx, params).await });

        match tokio::time::timeout(self.action_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(error))) => Err(DispatchError::Failed {
                action: entry.action.clone(),
                error,
            }),
            Ok(Err(join_err)) if join_err.is_panic() => Err(DispatchError::Panicked {
                action: entry.action.clone(),
            }),
            Ok(Err(_)) => Err(DispatchError::Cancelled {
                action: entry.action.clone(),
            }),
            Err(_) => {
                task.abort();
                Err(DispatchError::Timeout {
                    action: entry.action.clone(),
                    timeout: self.action_timeout,
                })
            }
        }
    }

    /// Advance the cycle for a cycling mapping and pick its preset
    ///
    /// Cycling without a non-empty preset list degrades to no preset.
    fn select_preset(&self, device_name: &str, entry: &MappingEntry) -> (Option<usize>, Option<ParamValue>) {
        if !entry.cycle {
            return (None, None);
        }

        let presets = match entry.presets() {
            Some(presets) if !presets.is_empty() => presets,
            _ => return (None, None),
        };

        let key = CycleKey::new(device_name, entry.match_rule.signature());
        let index = self.cycles.lock().advance(&key, presets.len());
        (Some(index), presets.get(index).cloned())
    }
}

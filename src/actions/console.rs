//! Console action - logs a message for testing mappings without side effects

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::{Action, ActionContext};
use crate::params::Params;

const DEFAULT_MESSAGE: &str = "Hello from print_message!";

/// Logs `message` together with the device and event that triggered it
///
/// This is useful for:
/// - Testing control mappings without Home Assistant
/// - Checking which rules fire for a given control
pub struct PrintMessage {
    /// Execution counter for debugging
    execution_count: AtomicU64,
}

impl PrintMessage {
    pub fn new() -> Self {
        Self {
            execution_count: AtomicU64::new(0),
        }
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }
}

impl Default for PrintMessage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for PrintMessage {
    fn name(&self) -> &str {
        "print_message"
    }

    fn description(&self) -> &str {
        "Log a message with the triggering device and event"
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        let message = params.opt_str("message")?.unwrap_or(DEFAULT_MESSAGE);
        let exec_num = self.execution_count.fetch_add(1, Ordering::Relaxed) + 1;

        let preset_info = ctx
            .preset_value
            .as_ref()
            .map(|p| format!(" [preset #{}: {}]", ctx.cycle_index.unwrap_or(0), p))
            .unwrap_or_default();

        info!(
            "  -> [{}] {}{}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            message,
            preset_info
        );
        info!("     Device: {}", ctx.device_name);
        info!("     MIDI: {}", ctx.event);

        debug!(
            device = %ctx.device_name,
            event = %ctx.event,
            params = %params,
            exec_count = exec_num,
            "print_message execution"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;
    use crate::params::ParamValue;

    fn ctx() -> ActionContext {
        ActionContext::new("pad", MidiEvent::ProgramChange { channel: 0, program: 2 })
    }

    #[tokio::test]
    async fn test_counts_executions() {
        let action = PrintMessage::new();

        for i in 0..3 {
            let mut ctx = ctx();
            ctx.cycle_index = Some(i);
            ctx.preset_value = Some(ParamValue::from("warm"));
            action
                .invoke(ctx, Params::new().with("message", "hi"))
                .await
                .unwrap();
        }

        assert_eq!(action.execution_count(), 3);
    }

    #[tokio::test]
    async fn test_message_is_optional_but_typed() {
        let action = PrintMessage::new();
        assert!(action.invoke(ctx(), Params::new()).await.is_ok());

        let err = action
            .invoke(ctx(), Params::new().with("message", 5i64))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("message"));
        assert_eq!(action.execution_count(), 1);
    }
}

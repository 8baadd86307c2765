//! Built-in shell command action

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

use super::{Action, ActionContext};
use crate::params::Params;

/// Default time a command may run before it is killed
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lines of stdout echoed to the log
const MAX_OUTPUT_LINES: usize = 3;

/// Run `command` through the platform shell
///
/// Params: `command` (required), `timeout_secs` (optional).
pub struct Shell {
    timeout: Duration,
}

impl Default for Shell {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Shell {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl Action for Shell {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command"
    }

    async fn invoke(&self, _ctx: ActionContext, params: Params) -> Result<()> {
        let command = params.str("command")?;
        let timeout = match params.get("timeout_secs") {
            Some(_) => Duration::from_secs(params.i64("timeout_secs")?.max(0) as u64),
            None => self.timeout,
        };

        let mut cmd = Self::build_command(command);
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .with_context(|| format!("Command timed out: {}", command))?
            .with_context(|| format!("Error running command: {}", command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Command failed ({}): {} {}", output.status, command, stderr.trim());
        }

        info!("  -> Executed: {}", command);
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.trim().lines().take(MAX_OUTPUT_LINES) {
            info!("     {}", line);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    fn ctx() -> ActionContext {
        ActionContext::new("pad", MidiEvent::NoteOn { channel: 0, note: 60, velocity: 100 })
    }

    #[tokio::test]
    async fn test_successful_command() {
        let params = Params::new().with("command", "echo hello");
        assert!(Shell::default().invoke(ctx(), params).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_is_error() {
        let params = Params::new().with("command", "echo oops >&2; exit 3");
        let err = Shell::default().invoke(ctx(), params).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Command failed"), "{}", msg);
        assert!(msg.contains("oops"), "{}", msg);
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let params = Params::new().with("command", "sleep 5");
        let err = Shell::with_timeout(Duration::from_millis(100))
            .invoke(ctx(), params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_command_param() {
        let err = Shell::default().invoke(ctx(), Params::new()).await.unwrap_err();
        assert!(err.to_string().contains("command"));
    }
}

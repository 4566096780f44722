//! Power-cycle by running an external program.

use remedy_common::{ActuationError, Actuator, Entity};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs `program args... <machine name>`; exit status 0 is success.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    program: String,
    args: Vec<String>,
}

impl CommandActuator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Actuator for CommandActuator {
    async fn power_cycle(&self, entity: &Entity) -> Result<(), ActuationError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&entity.name)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ActuationError::Spawn(format!("{}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(machine = %entity.name, "{}", stdout.trim());
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ActuationError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

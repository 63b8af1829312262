//! External command execution with a hard timeout.
//!
//! Children run in their own process group so that a timeout takes down the
//! whole tree, not only the direct child.

use crate::plugin::interface::{PluginError, PluginResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Error code for a program that could not be started.
pub const SPAWN_ERROR: &str = "SPAWN_ERROR";

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Trimmed standard output
    pub stdout: String,
    /// Trimmed standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns external programs for CLI-backed plugins.
#[derive(Clone, Debug, Default)]
pub struct CommandRunner {
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    /// Create a runner using the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir`.
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Directory commands run in, if overridden.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Run `program` with `args`, killing it once `limit` elapses.
    ///
    /// Spawn failures surface as `SPAWN_ERROR`, expiry as a timeout error.
    /// A non-zero exit is not an error; inspect [`CommandOutput::success`].
    pub async fn run(&self, program: &str, args: &[&str], limit: Duration) -> PluginResult<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %program, "Spawning command");
        let child = cmd.spawn().map_err(|e| {
            PluginError::new(&format!("failed to spawn {}: {}", program, e)).with_code(SPAWN_ERROR)
        })?;
        let pid = child.id();

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(e)) => Err(PluginError::from(e)),
            Err(_) => {
                kill_process_group(pid);
                warn!(program = %program, "Command timed out after {:?}", limit);
                Err(PluginError::timeout(&format!(
                    "{} timed out after {} seconds",
                    program,
                    limit.as_secs_f64()
                )))
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: sends a signal to the group created for this child; no memory is touched.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill on all platforms.
//! On Unix a timed-out child is first sent SIGINT so the engine can persist
//! its state, and only killed if it outlives the grace period.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Child;

use crate::application::ports::{CommandRunner, CommandSpec, INTERRUPT_GRACE};
use crate::domain::CommandTimedOut;

/// Default timeout for short engine commands (version, output).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Production `CommandRunner` backed by `tokio::process`, with a timeout
/// that kills the child.
///
/// Dropping an `.output()` future leaves the OS process running, so the
/// timeout path races the child in `tokio::select!` and stops it explicitly.
/// A dropped run still kills its child through `kill_on_drop`.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, cmd: &CommandSpec<'_>) -> Result<Output> {
        self.run_with_timeout(cmd, self.timeout).await
    }

    async fn run_with_timeout(&self, cmd: &CommandSpec<'_>, timeout: Duration) -> Result<Output> {
        let program = cmd.program;
        let mut command = tokio::process::Command::new(program);
        command
            .args(cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cmd.dir {
            command.current_dir(dir);
        }
        tracing::trace!(program, args = ?cmd.args, dir = ?cmd.dir, "spawning");
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                stop(&mut child, program).await;
                Err(CommandTimedOut {
                    program: program.to_string(),
                    after: timeout,
                }
                .into())
            }
        }
    }
}

/// Interrupt `child`, then kill it if it is still running after
/// [`INTERRUPT_GRACE`].
async fn stop(child: &mut Child, program: &str) {
    if interrupt(child).await {
        match tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
            Ok(_) => {
                tracing::debug!(program, "stopped after interrupt");
                return;
            }
            Err(_) => tracing::warn!(
                program,
                grace_secs = INTERRUPT_GRACE.as_secs(),
                "still running after interrupt, killing"
            ),
        }
    }
    let _ = child.kill().await;
}

/// Send SIGINT. Returns `false` if the signal could not be delivered.
#[cfg(unix)]
async fn interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    tokio::process::Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn interrupt(_: &Child) -> bool {
    false
}

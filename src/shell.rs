//! External command execution
//!
//! Every hardware change and every device query goes through a [`CommandRunner`].
//! The production runner spawns the tool, waits with a fixed time budget and
//! captures trimmed stdout/stderr. Tests swap in a scripted runner.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::DeviceError;

/// Default time budget for a single external command
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A program plus its arguments, passed without a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best available explanation of a failure
    #[must_use]
    pub fn diagnostic(&self) -> String {
        if !self.stderr.is_empty() {
            return self.stderr.clone();
        }
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands to completion
///
/// `Ok` means the process ran and exited (with any status); `Err` means it could
/// not be started or was killed for exceeding the time budget.
pub trait CommandRunner {
    /// # Errors
    /// Returns [`DeviceError::CommandFailed`] if the program cannot be spawned and
    /// [`DeviceError::Timeout`] if it runs too long.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, DeviceError>;
}

/// Run a command and treat a nonzero exit as an error
///
/// # Errors
/// Propagates runner errors and maps nonzero exits to [`DeviceError::CommandFailed`]
/// carrying the captured stderr.
pub fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> Result<CommandOutput, DeviceError> {
    debug!("Executing: {}", invocation);
    let output = runner.run(invocation)?;
    if output.success() {
        Ok(output)
    } else {
        Err(DeviceError::CommandFailed {
            command: invocation.to_string(),
            message: output.diagnostic(),
        })
    }
}

/// Spawns real processes with a per-command timeout
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

impl SystemRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Spawn and collect output; the budget covers the whole exchange, including
    /// pipes kept open by anything the tool leaves running in the background
    async fn run_async(&self, invocation: &Invocation, command: &str) -> Result<CommandOutput, DeviceError> {
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeviceError::CommandFailed {
                command: command.to_string(),
                message: format!("error executing command: {e}"),
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                code: output.status.code(),
                stdout: trimmed(&output.stdout),
                stderr: trimmed(&output.stderr),
            }),
            Ok(Err(e)) => Err(DeviceError::CommandFailed {
                command: command.to_string(),
                message: format!("error waiting for command: {e}"),
            }),
            // Dropping the output future drops the child, which kills it
            Err(_) => Err(DeviceError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, DeviceError> {
        let command = invocation.to_string();

        // Callers are synchronous; each command gets its own small runtime
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DeviceError::CommandFailed {
                command: command.clone(),
                message: format!("failed to start runtime: {e}"),
            })?;

        let output = runtime.block_on(self.run_async(invocation, &command))?;
        trace!("`{}` exited with {:?}", command, output.code);
        Ok(output)
    }
}

/// Check whether an executable with this name is on `PATH`
#[must_use]
pub fn tool_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

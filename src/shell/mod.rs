//! Shell abstraction
//!
//! One [`Shell`] per [`ShellVariant`]. Every variant shares the same
//! operation set; the variant tag decides how a command line is handed to the
//! operating system (a POSIX `sh -c` line or a structured PowerShell
//! invocation) and which translation table applies.
//!
//! Commands that run but fail, and commands that cannot be started at all,
//! both come back as an [`ExecutionResult`] with `success == false`.

mod variant;

pub use variant::{PathFamily, ShellVariant};

use crate::config::ShellConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of running one command on one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    pub exit_code: i32,
    #[serde(rename = "platform")]
    pub variant: ShellVariant,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// A failed result for a command that never produced an exit status
    #[must_use]
    pub fn failure(variant: ShellVariant, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            exit_code: -1,
            variant,
            timestamp: Utc::now(),
        }
    }
}

/// Per-variant working directory, environment and history
#[derive(Debug, Clone, Default)]
pub struct TerminalState {
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub history: Vec<String>,
}

/// Summary of one shell's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub name: String,
    pub variant: ShellVariant,
    pub current_path: String,
    pub environment_vars: usize,
    pub history_size: usize,
}

/// A single shell environment
#[derive(Debug, Clone)]
pub struct Shell {
    variant: ShellVariant,
    state: TerminalState,
    posix_program: String,
    windows_program: String,
    timeout: Duration,
    max_history: usize,
    device_id: Option<String>,
}

impl Shell {
    /// Create a shell for `variant`, starting in the user's home directory
    #[must_use]
    pub fn new(variant: ShellVariant, config: &ShellConfig) -> Self {
        let cwd = dirs::home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        Self {
            variant,
            state: TerminalState {
                cwd,
                env: config.env.clone(),
                history: Vec::new(),
            },
            posix_program: config.posix_program.clone(),
            windows_program: config.windows_program.clone(),
            timeout: Duration::from_secs(config.execution_timeout_secs),
            max_history: config.max_history,
            device_id: None,
        }
    }

    #[must_use]
    pub fn variant(&self) -> ShellVariant {
        self.variant
    }

    /// Execution budget applied by [`Shell::execute`]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` in the current working directory with the default budget
    pub async fn execute(&mut self, command: &str) -> ExecutionResult {
        self.execute_with_timeout(command, self.timeout).await
    }

    /// Run `command` with an explicit budget.
    ///
    /// A command still running when the budget expires is killed and reported
    /// as a failure with exit code -1.
    pub async fn execute_with_timeout(&mut self, command: &str, budget: Duration) -> ExecutionResult {
        self.add_to_history(command);

        let mut cmd = self.invocation(command);
        cmd.current_dir(&self.state.cwd)
            .envs(&self.state.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout reaches everything the command line forked
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(variant = %self.variant, cwd = %self.state.cwd.display(), "Executing: {}", command);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(variant = %self.variant, "Failed to start command: {}", e);
                return ExecutionResult::failure(self.variant, format!("Failed to start command: {e}"));
            }
        };

        let pid = child.id();

        // Dropping the wait future on timeout drops the child, which kills and reaps it.
        match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                info!(variant = %self.variant, exit_code, "Command finished");
                ExecutionResult {
                    success: output.status.success(),
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    error: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                    variant: self.variant,
                    timestamp: Utc::now(),
                }
            }
            Ok(Err(e)) => ExecutionResult::failure(self.variant, format!("Failed to collect output: {e}")),
            Err(_) => {
                let err = crate::Error::execution_timeout(budget);
                warn!(variant = %self.variant, "{}", err);
                kill_process_group(pid);
                ExecutionResult::failure(self.variant, err.to_string())
            }
        }
    }

    /// Build the native invocation for this variant
    fn invocation(&self, command: &str) -> Command {
        match self.variant {
            ShellVariant::Windows => {
                let mut cmd = Command::new(&self.windows_program);
                cmd.args(["-NoProfile", "-NonInteractive", "-Command", command]);
                cmd
            }
            ShellVariant::Mobile => {
                let line = match &self.device_id {
                    Some(id) => format!("{command} -u {id}"),
                    None => command.to_string(),
                };
                let mut cmd = Command::new(&self.posix_program);
                cmd.arg("-c").arg(line);
                cmd
            }
            ShellVariant::Linux | ShellVariant::MacOs => {
                let mut cmd = Command::new(&self.posix_program);
                cmd.arg("-c").arg(command);
                cmd
            }
        }
    }

    /// Rewrite a command written for `source` into this shell's vocabulary
    #[must_use]
    pub fn translate_from(&self, command: &str, source: ShellVariant) -> String {
        crate::translator::translate(command, source, self.variant)
    }

    /// Change the working directory.
    ///
    /// Relative paths resolve against the current directory. Returns `false`
    /// and leaves the state untouched when the target is not an existing
    /// directory.
    pub fn change_directory(&mut self, path: &str) -> bool {
        let candidate = Path::new(path);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.state.cwd.join(candidate)
        };

        match candidate.canonicalize() {
            Ok(resolved) if resolved.is_dir() => {
                debug!(variant = %self.variant, "cwd -> {}", resolved.display());
                self.state.cwd = resolved;
                true
            }
            _ => {
                debug!(variant = %self.variant, "Directory not found: {}", path);
                false
            }
        }
    }

    #[must_use]
    pub fn current_path(&self) -> &Path {
        &self.state.cwd
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.state.env.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.state.env.get(key).map(String::as_str)
    }

    pub fn add_to_history(&mut self, command: &str) {
        self.state.history.push(command.to_string());
        if self.state.history.len() > self.max_history {
            let excess = self.state.history.len() - self.max_history;
            self.state.history.drain(..excess);
        }
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.state.history
    }

    pub fn clear_history(&mut self) {
        self.state.history.clear();
    }

    /// Bind the mobile shell to a device; ignored for other variants
    pub fn connect_device(&mut self, device_id: Option<String>) {
        if self.variant == ShellVariant::Mobile {
            self.device_id = device_id;
        }
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    #[must_use]
    pub fn info(&self) -> TerminalInfo {
        TerminalInfo {
            name: self.variant.display_name().to_string(),
            variant: self.variant,
            current_path: self.state.cwd.display().to_string(),
            environment_vars: self.state.env.len(),
            history_size: self.state.history.len(),
        }
    }
}

/// Kill every process left in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };

    // SAFETY: killpg only sends a signal; the group was created for this command.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, "Process group already gone: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

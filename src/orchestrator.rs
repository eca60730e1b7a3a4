//! Multi-variant orchestration
//!
//! Owns one [`Shell`] per [`ShellVariant`] plus the "current" pointer, and
//! composes translation, path conversion and execution. When a remote
//! [`Server`] is attached, commands can also be forwarded to agents.

use crate::config::ShellConfig;
use crate::paths;
use crate::remote::Server;
use crate::shell::{ExecutionResult, Shell, ShellVariant, TerminalInfo};
use crate::translator;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// A translated command together with its execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedExecution {
    pub original_command: String,
    pub translated_command: String,
    pub source: ShellVariant,
    pub target: ShellVariant,
    pub result: ExecutionResult,
}

/// Snapshot of every shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub current: ShellVariant,
    pub available: Vec<ShellVariant>,
    pub current_paths: BTreeMap<ShellVariant, String>,
    pub terminals: BTreeMap<ShellVariant, TerminalInfo>,
}

pub struct Orchestrator {
    shells: [Shell; 4],
    current: ShellVariant,
    home_user: String,
    remote: Option<Server>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        let shells = ShellVariant::ALL.map(|variant| Shell::new(variant, config));

        Self {
            shells,
            current: config.default_variant,
            home_user: config.home_user.clone(),
            remote: None,
        }
    }

    /// Attach a server so commands can be forwarded to remote agents
    #[must_use]
    pub fn with_remote(mut self, server: Server) -> Self {
        self.remote = Some(server);
        self
    }

    #[must_use]
    pub fn current(&self) -> ShellVariant {
        self.current
    }

    pub fn set_current(&mut self, variant: ShellVariant) {
        info!("Active shell: {}", variant);
        self.current = variant;
    }

    #[must_use]
    pub fn variants(&self) -> Vec<ShellVariant> {
        self.shells.iter().map(Shell::variant).collect()
    }

    #[must_use]
    pub fn shell(&self, variant: ShellVariant) -> &Shell {
        &self.shells[variant.index()]
    }

    pub fn shell_mut(&mut self, variant: ShellVariant) -> &mut Shell {
        &mut self.shells[variant.index()]
    }

    /// Execute on `variant`, or on the current variant
    pub async fn execute(&mut self, command: &str, variant: Option<ShellVariant>) -> ExecutionResult {
        let target = variant.unwrap_or(self.current);
        self.shell_mut(target).execute(command).await
    }

    /// Translate from `source` to `target`, then execute on `target`
    pub async fn translate_and_execute(
        &mut self,
        command: &str,
        source: ShellVariant,
        target: ShellVariant,
    ) -> TranslatedExecution {
        let translated = translator::translate(command, source, target);
        debug!(%source, %target, "Translated '{}' -> '{}'", command, translated);
        let result = self.execute(&translated, Some(target)).await;

        TranslatedExecution {
            original_command: command.to_string(),
            translated_command: translated,
            source,
            target,
            result,
        }
    }

    /// Translate and execute on every variant.
    ///
    /// Each variant runs independently; a failure on one is recorded in its
    /// own result and does not stop the others.
    pub async fn execute_on_all(
        &mut self,
        command: &str,
        source: ShellVariant,
    ) -> BTreeMap<ShellVariant, TranslatedExecution> {
        let runs = self.shells.iter_mut().map(|shell| {
            let target = shell.variant();
            async move {
                let translated = translator::translate(command, source, target);
                let result = shell.execute(&translated).await;
                (
                    target,
                    TranslatedExecution {
                        original_command: command.to_string(),
                        translated_command: translated,
                        source,
                        target,
                        result,
                    },
                )
            }
        });

        join_all(runs).await.into_iter().collect()
    }

    /// Change directory on `variant`, or on the current variant
    pub fn change_directory(&mut self, path: &str, variant: Option<ShellVariant>) -> bool {
        let target = variant.unwrap_or(self.current);
        self.shell_mut(target).change_directory(path)
    }

    #[must_use]
    pub fn current_path(&self, variant: Option<ShellVariant>) -> String {
        let target = variant.unwrap_or(self.current);
        self.shell(target).current_path().display().to_string()
    }

    /// Apply the base variant's working directory to every other variant.
    ///
    /// Returns the change-directory outcome per variant; variants whose
    /// converted path does not exist keep their old directory.
    pub fn sync_directories(&mut self, base: Option<ShellVariant>) -> BTreeMap<ShellVariant, bool> {
        let base = base.unwrap_or(self.current);
        let base_path = self.current_path(Some(base));

        self.shells
            .iter_mut()
            .filter(|shell| shell.variant() != base)
            .map(|shell| {
                let variant = shell.variant();
                let converted = paths::convert(&base_path, base, variant);
                let changed = shell.change_directory(&converted);
                debug!(%variant, changed, "Synced directory to {}", converted);
                (variant, changed)
            })
            .collect()
    }

    /// Expand `~` with the configured placeholder user
    #[must_use]
    pub fn expand_home(&self, path: &str, variant: ShellVariant) -> String {
        paths::expand_home_for(path, variant, &self.home_user)
    }

    #[must_use]
    pub fn suggest_translations(&self, command: &str, source: ShellVariant) -> BTreeMap<ShellVariant, String> {
        translator::suggest_translations(command, source)
    }

    #[must_use]
    pub fn common_commands(&self) -> &'static BTreeMap<&'static str, BTreeMap<ShellVariant, &'static str>> {
        translator::common_commands()
    }

    #[must_use]
    pub fn history(&self, variant: Option<ShellVariant>) -> &[String] {
        self.shell(variant.unwrap_or(self.current)).history()
    }

    pub fn clear_history(&mut self, variant: Option<ShellVariant>) {
        let target = variant.unwrap_or(self.current);
        self.shell_mut(target).clear_history();
    }

    /// Forward a command to the agent registered for `platform`.
    ///
    /// Without an attached server this fails the same way an unregistered
    /// platform does.
    pub async fn execute_remote(&self, platform: ShellVariant, command: &str, timeout: Duration) -> ExecutionResult {
        match &self.remote {
            Some(server) => server.dispatch(platform, command, timeout).await,
            None => ExecutionResult::failure(platform, crate::Error::NoAgent(platform).to_string()),
        }
    }

    /// Translate for `target` and forward to its agent
    pub async fn translate_and_dispatch(
        &self,
        command: &str,
        source: ShellVariant,
        target: ShellVariant,
        timeout: Duration,
    ) -> TranslatedExecution {
        let translated = translator::translate(command, source, target);
        let result = self.execute_remote(target, &translated, timeout).await;

        TranslatedExecution {
            original_command: command.to_string(),
            translated_command: translated,
            source,
            target,
            result,
        }
    }

    #[must_use]
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            current: self.current,
            available: self.variants(),
            current_paths: self
                .shells
                .iter()
                .map(|shell| (shell.variant(), shell.current_path().display().to_string()))
                .collect(),
            terminals: self.shells.iter().map(|shell| (shell.variant(), shell.info())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ShellVariant::{Linux, MacOs, Mobile, Windows};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(&ShellConfig::default())
    }

    #[test]
    fn test_owns_every_variant() {
        let orch = orchestrator();
        assert_eq!(orch.variants(), ShellVariant::ALL.to_vec());
        assert_eq!(orch.current(), Linux);
    }

    #[test]
    fn test_sync_directories_posix_family() {
        let dir = tempdir().unwrap();
        let mut orch = orchestrator();
        assert!(orch.change_directory(dir.path().to_str().unwrap(), Some(Linux)));

        let outcome = orch.sync_directories(Some(Linux));
        assert_eq!(outcome.len(), 3);
        assert!(!outcome.contains_key(&Linux));

        if cfg!(unix) {
            assert!(outcome[&MacOs]);
            assert!(outcome[&Mobile]);
            assert_eq!(orch.current_path(Some(MacOs)), orch.current_path(Some(Linux)));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_directories_missing_path_is_silent() {
        let dir = tempdir().unwrap();
        let mut orch = orchestrator();
        let windows_before = orch.current_path(Some(Windows));
        assert!(orch.change_directory(dir.path().to_str().unwrap(), Some(Linux)));

        // `\tmp\...` does not exist on a POSIX host, so Windows keeps its cwd
        let outcome = orch.sync_directories(None);
        assert!(!outcome[&Windows]);
        assert_eq!(orch.current_path(Some(Windows)), windows_before);
    }

    #[test]
    fn test_expand_home_uses_configured_user() {
        let config = ShellConfig {
            home_user: "kris".into(),
            ..ShellConfig::default()
        };
        let orch = Orchestrator::new(&config);
        assert_eq!(orch.expand_home("~/src", MacOs), "/Users/kris/src");
    }

    #[tokio::test]
    async fn test_execute_remote_without_server() {
        let orch = orchestrator();
        let result = orch.execute_remote(MacOs, "echo hi", Duration::from_secs(1)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.error, "No agent available for platform: macos");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translate_and_execute_records_both_commands() {
        let mut orch = orchestrator();
        let run = orch.translate_and_execute("Write-Output hello", Windows, Linux).await;
        assert_eq!(run.translated_command, "echo hello");
        assert!(run.result.success);
        assert_eq!(run.result.output.trim(), "hello");
        assert_eq!(orch.history(Some(Linux)), ["echo hello"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_on_all_tolerates_failures() {
        let config = ShellConfig {
            windows_program: "/nonexistent/pwsh".into(),
            ..ShellConfig::default()
        };
        let mut orch = Orchestrator::new(&config);
        let results = orch.execute_on_all("echo hi", Linux).await;

        assert_eq!(results.len(), 4);
        assert!(results[&Linux].result.success);
        assert!(results[&MacOs].result.success);
        assert_eq!(results[&Windows].translated_command, "Write-Output hi");
        assert!(!results[&Windows].result.success);
        assert_eq!(results[&Windows].result.exit_code, -1);
    }

    #[test]
    fn test_status_snapshot() {
        let mut orch = orchestrator();
        orch.set_current(Windows);
        let status = orch.status();
        assert_eq!(status.current, Windows);
        assert_eq!(status.terminals.len(), 4);
        assert_eq!(status.terminals[&Windows].name, "PowerShell");
    }
}

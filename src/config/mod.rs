use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shell::ShellVariant;

/// Main configuration, loaded once and passed down explicitly
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Variant used when a command names none
    #[serde(default = "default_variant")]
    pub default_variant: ShellVariant,

    /// Budget for a single local command
    #[serde(default = "default_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// Maximum command history entries per variant
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Program used for Linux, macOS and mobile command lines
    #[serde(default = "default_posix_program")]
    pub posix_program: String,

    /// Program used for Windows command lines
    #[serde(default = "detect_windows_program")]
    pub windows_program: String,

    /// Placeholder user segment for `~` expansion
    #[serde(default = "default_home_user")]
    pub home_user: String,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Platform identity override; detected from the host when absent
    #[serde(default)]
    pub platform: Option<ShellVariant>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory for session logs and event logs
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

// Default value functions
fn default_variant() -> ShellVariant {
    ShellVariant::Linux
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_history() -> usize {
    10000
}

fn default_posix_program() -> String {
    "sh".to_string()
}

fn default_home_user() -> String {
    "user".to_string()
}

fn default_server_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_session_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".polyshell")
        .join("server")
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_variant: default_variant(),
            execution_timeout_secs: default_timeout_secs(),
            max_history: default_max_history(),
            posix_program: default_posix_program(),
            windows_program: detect_windows_program(),
            home_user: default_home_user(),
            env: HashMap::new(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            platform: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            heartbeat_interval_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_root: default_session_root(),
            dispatch_timeout_secs: default_timeout_secs(),
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl ServerConfig {
    /// `host:port` pair for binding the listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load `~/.polyshell/config.yaml`, or defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read polyshell config {}", path.display()))?;

        serde_yaml::from_str(&yaml).with_context(|| format!("Invalid polyshell config {}", path.display()))
    }

    /// Write the configuration as YAML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize polyshell config")?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        fs::write(path, yaml).with_context(|| format!("Failed to write polyshell config {}", path.display()))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("No home directory to look for .polyshell/config.yaml in")?;
        Ok(home.join(".polyshell").join("config.yaml"))
    }
}

/// Pick the PowerShell binary available on this host
fn detect_windows_program() -> String {
    // PowerShell 7+ first, then Windows PowerShell 5.1
    if which::which("pwsh").is_ok() {
        return "pwsh".to_string();
    }

    if which::which("powershell").is_ok() {
        return "powershell".to_string();
    }

    "powershell.exe".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.shell.execution_timeout_secs, 30);
        assert_eq!(config.shell.default_variant, ShellVariant::Linux);
        assert_eq!(config.agent.max_retries, 10);
        assert_eq!(config.agent.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.agent.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.server.bind_address(), "0.0.0.0:8765");
    }

    #[test]
    fn test_partial_deserialization() {
        let yaml = r#"
agent:
  server_url: ws://10.0.0.5:9000
  platform: ios
  max_retries: 3
server:
  port: 9000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent.server_url, "ws://10.0.0.5:9000");
        assert_eq!(config.agent.platform, Some(ShellVariant::Mobile));
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.agent.retry_delay_secs, 5);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.shell.posix_program, "sh");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.shell.home_user = "kris".to_string();
        config.server.dispatch_timeout_secs = 12;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.shell.home_user, "kris");
        assert_eq!(loaded.server.dispatch_timeout_secs, 12);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from_file(dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "shell: [not, a, map]\n").unwrap();

        let err = format!("{:#}", Config::load_from_file(&path).unwrap_err());
        assert!(err.contains("Invalid polyshell config"), "{err}");
        assert!(err.contains("broken.yaml"), "{err}");

        let missing = format!("{:#}", Config::load_from_file(dir.path().join("absent.yaml")).unwrap_err());
        assert!(missing.contains("absent.yaml"), "{missing}");
    }
}

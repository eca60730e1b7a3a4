use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identity of one of the supported target shells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellVariant {
    Linux,
    #[serde(rename = "macos", alias = "darwin")]
    MacOs,
    #[serde(alias = "ios")]
    Mobile,
    #[serde(alias = "powershell")]
    Windows,
}

/// Which path syntax a variant speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFamily {
    Posix,
    Windows,
}

impl ShellVariant {
    /// Every variant, in a fixed order
    pub const ALL: [ShellVariant; 4] = [
        ShellVariant::Linux,
        ShellVariant::MacOs,
        ShellVariant::Mobile,
        ShellVariant::Windows,
    ];

    /// Position in [`ShellVariant::ALL`]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShellVariant::Linux => "linux",
            ShellVariant::MacOs => "macos",
            ShellVariant::Mobile => "mobile",
            ShellVariant::Windows => "windows",
        }
    }

    /// Human readable terminal name
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ShellVariant::Linux => "Linux Terminal",
            ShellVariant::MacOs => "macOS Terminal",
            ShellVariant::Mobile => "Mobile Device Terminal",
            ShellVariant::Windows => "PowerShell",
        }
    }

    #[must_use]
    pub fn path_family(self) -> PathFamily {
        match self {
            ShellVariant::Windows => PathFamily::Windows,
            ShellVariant::Linux | ShellVariant::MacOs | ShellVariant::Mobile => PathFamily::Posix,
        }
    }

    /// Detect the variant of the host this process runs on
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            ShellVariant::Windows
        } else if cfg!(target_os = "macos") {
            ShellVariant::MacOs
        } else if cfg!(target_os = "ios") || Path::new("/var/mobile").exists() {
            ShellVariant::Mobile
        } else {
            ShellVariant::Linux
        }
    }
}

impl fmt::Display for ShellVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(ShellVariant::Linux),
            "macos" | "darwin" | "mac" => Ok(ShellVariant::MacOs),
            "mobile" | "ios" => Ok(ShellVariant::Mobile),
            "windows" | "powershell" | "win32" => Ok(ShellVariant::Windows),
            _ => Err(Error::UnsupportedSystem(s.to_string())),
        }
    }
}
